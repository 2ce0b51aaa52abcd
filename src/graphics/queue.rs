//! The graphics queue.

pub use super::*;

use parking_lot::Mutex;
use std::{
    sync::{mpsc, Arc},
    thread,
    time::Duration,
};

/// A batch of work for the [`Queue`].
///
/// The queue waits on `waits`, executes the command buffer, signals
/// `signals`, then completes `fence`.
#[derive(Clone, Debug, Default)]
pub struct Submission {
    pub waits: Vec<Arc<BinarySemaphore>>,
    pub command_buffer: Arc<CommandBuffer>,
    pub constants: PushConstants,
    pub signals: Vec<Arc<BinarySemaphore>>,
    pub fence: Option<Arc<Fence>>,
}

/// An in-order queue executing submissions on its own thread.
///
/// Submitting never blocks the host. The first failure loses the device,
/// after which every submission fails.
#[derive(Debug)]
pub struct Queue {
    lost: Arc<Mutex<Option<Error>>>,
    sender: Option<mpsc::Sender<Submission>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Queue {
    pub fn new(
        label: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Submission>();
        let lost = Arc::new(Mutex::new(None::<Error>));

        let worker = {
            let lost = lost.to_owned();
            thread::Builder::new()
                .name(label.to_owned())
                .spawn(move || {
                    for submission in receiver {
                        let error = lost.lock().to_owned();
                        let result = match error {
                            Some(error) => Err(error),
                            None => Self::execute(&submission, timeout),
                        };

                        if let Err(error) = &result {
                            log::error!(
                                target: "nrc_renderer::graphics",
                                "queue > {}: {error}",
                                submission.command_buffer.label(),
                            );
                            let mut lost = lost.lock();
                            if lost.is_none() {
                                *lost = Some(error.to_owned());
                            }
                        }
                        if let Some(fence) = &submission.fence {
                            fence.complete(result);
                        }
                    }
                })
                .map_err(|error| {
                    Error::ResourceExhaustion(format!(
                        "Spawning the queue thread {label}: {error}"
                    ))
                })?
        };

        Ok(Self {
            lost,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    fn execute(
        submission: &Submission,
        timeout: Duration,
    ) -> Result<()> {
        for semaphore in &submission.waits {
            semaphore.wait(timeout)?;
        }
        submission.command_buffer.execute(&submission.constants)?;
        for semaphore in &submission.signals {
            semaphore.signal()?;
        }
        Ok(())
    }

    /// Enqueues the submission without waiting for it.
    pub fn submit(
        &self,
        submission: Submission,
    ) -> Result<()> {
        if let Some(error) = self.lost.lock().to_owned() {
            return Err(Error::DeviceLost(error.to_string()));
        }
        self.sender
            .as_ref()
            .ok_or_else(|| Error::DeviceLost("The queue is shut down".into()))?
            .send(submission)
            .map_err(|_| Error::DeviceLost("The queue thread exited".into()))
    }

    /// The error that lost the device, if any.
    #[inline]
    pub fn lost(&self) -> Option<Error> {
        self.lost.lock().to_owned()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!(target: "nrc_renderer::graphics", "queue > panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

    struct Counter(AtomicU64);

    impl super::ComputePass for Counter {
        fn label(&self) -> &str {
            "counter"
        }

        fn dispatch(
            &self,
            constants: &super::PushConstants,
        ) -> super::Result<()> {
            self.0.fetch_add(constants.frame_index, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl super::ComputePass for Failing {
        fn label(&self) -> &str {
            "failing"
        }

        fn dispatch(
            &self,
            _: &super::PushConstants,
        ) -> super::Result<()> {
            Err(super::Error::DeviceLost("failing pass".into()))
        }
    }

    #[test]
    fn in_order_execution() {
        use super::*;
        use std::sync::atomic::{AtomicU64, Ordering};

        let queue = Queue::new("test-queue", TIMEOUT).unwrap();
        let counter = Arc::new(Counter(AtomicU64::new(0)));
        let commands = Arc::new(CommandBuffer::new("count").record(counter.to_owned()));

        let fence = Arc::new(Fence::new());
        for frame_index in 1..=4 {
            queue
                .submit(Submission {
                    command_buffer: commands.to_owned(),
                    constants: PushConstants {
                        frame_index,
                        seed: 0,
                    },
                    fence: (frame_index == 4).then(|| fence.to_owned()),
                    ..Default::default()
                })
                .unwrap();
        }

        fence.wait(TIMEOUT).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn failure_loses_device() {
        use super::*;

        let queue = Queue::new("test-queue", TIMEOUT).unwrap();
        let fence = Arc::new(Fence::new());
        queue
            .submit(Submission {
                command_buffer: Arc::new(
                    CommandBuffer::new("fail").record(Arc::new(Failing)),
                ),
                fence: Some(fence.to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(
            fence.wait(TIMEOUT),
            Err(Error::DeviceLost("failing pass".into()))
        );
        assert!(queue.lost().is_some());
        assert!(matches!(
            queue.submit(Default::default()),
            Err(Error::DeviceLost(_))
        ));
    }

    #[test]
    fn waits_and_signals() {
        use super::*;

        let queue = Queue::new("test-queue", TIMEOUT).unwrap();
        let domain = Arc::new(HandoffDomain::new());
        let pair = SyncPair::new("test", &domain);

        let fence = Arc::new(Fence::new());
        queue
            .submit(Submission {
                signals: vec![pair.start.to_owned()],
                ..Default::default()
            })
            .unwrap();
        queue
            .submit(Submission {
                waits: vec![pair.finished.to_owned()],
                fence: Some(fence.to_owned()),
                ..Default::default()
            })
            .unwrap();

        pair.start.wait(TIMEOUT).unwrap();
        assert!(!fence.is_signaled());
        pair.finished.signal().unwrap();

        fence.wait(TIMEOUT).unwrap();
        assert_eq!(domain.state(), HandoffState::GraphicsActive);
    }
}
