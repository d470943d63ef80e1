//! Worker thread running one engine, so that cycles don't block the thread receiving clouds.
//!
//! Each worker owns its engine outright, so cycles on one grid never interleave and workers for
//! different grids share nothing. Replies are sent in the order the cycles complete.

// -----------------------------------------------------------------------------------------------
// INCLUDES
// -----------------------------------------------------------------------------------------------

use std::{
    io,
    sync::mpsc::{channel, Receiver, RecvError, SendError, Sender, TryRecvError},
    thread::{self, JoinHandle},
};

use comms_if::map::OccupancyGridMsg;
use log::{debug, warn};

use crate::{
    fusion::{CancelToken, CycleInput, CycleOutcome, OgmEngine, OgmError, StatusReport},
    loc::LookupError,
    publisher::{GridPublisher, PublishError},
};

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Handle to a running engine worker.
#[derive(Debug)]
pub struct EngineWorker {
    worker_jh: JoinHandle<Result<(), WorkerError>>,

    worker_sender: Sender<WorkerSignal>,
    worker_reciever: Receiver<WorkerSignal>,

    cancel: CancelToken,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

#[derive(Debug)]
pub enum WorkerSignal {
    /// The worker should stop it's operations
    Stop,

    /// A new pair of clouds to fuse into the grid
    NewClouds(Box<CycleInput>),

    /// A cycle completed, giving the published grid and the cycle's status report
    Snapshot(Box<OccupancyGridMsg>, Box<StatusReport>),

    /// A cycle was skipped as a pose couldn't be found
    Skipped(LookupError),

    /// A cycle was cancelled before modifying the grid
    Cancelled,

    /// Unhandlable error
    Error(Box<WorkerError>),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Engine error: {0}")]
    OgmError(OgmError),

    #[error("Couldn't publish the grid: {0}")]
    PublishError(PublishError),

    #[error("Couldn't start the worker thread: {0}")]
    SpawnError(io::Error),

    #[error("Failed to send signal {0:?} between threads")]
    SendError(WorkerSignal),

    #[error("Failed to receive signal between threads")]
    RecvError,

    #[error("The worker thread panicked")]
    WorkerPanicked,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl EngineWorker {
    /// Start a worker thread which owns the given engine and publishes with `publisher`.
    pub fn spawn(
        name: &str,
        engine: OgmEngine,
        publisher: GridPublisher,
    ) -> Result<Self, WorkerError> {
        let cancel = engine.cancel_token();

        // Create channels
        let (worker_sender, rx) = channel();
        let (tx, worker_reciever) = channel();

        // Start worker thread
        let worker_jh = thread::Builder::new()
            .name(format!("ogm::worker::{}", name))
            .spawn(move || worker_thread(engine, publisher, tx, rx))
            .map_err(WorkerError::SpawnError)?;

        Ok(Self {
            worker_jh,
            worker_sender,
            worker_reciever,
            cancel,
        })
    }

    /// Queue a cycle on the worker.
    pub fn send_clouds(&self, input: CycleInput) -> Result<(), WorkerError> {
        self.worker_sender
            .send(WorkerSignal::NewClouds(Box::new(input)))?;
        Ok(())
    }

    /// Block until the worker replies.
    pub fn recv(&self) -> Result<WorkerSignal, WorkerError> {
        Ok(self.worker_reciever.recv()?)
    }

    /// Get the next reply from the worker if there is one.
    pub fn try_recv(&self) -> Result<Option<WorkerSignal>, WorkerError> {
        match self.worker_reciever.try_recv() {
            Ok(s) => Ok(Some(s)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerError::RecvError),
        }
    }

    /// Cancel the cycle in progress, or the next one if the current cycle is already updating
    /// the grid.
    pub fn cancel(&self) {
        self.cancel.cancel()
    }

    /// Stop the worker once it has finished any queued cycles and wait for it to exit.
    pub fn stop(self) -> Result<(), WorkerError> {
        // The worker may already have exited with an error, which join reports
        if self.worker_sender.send(WorkerSignal::Stop).is_err() {
            warn!("OGM worker had already stopped");
        }

        match self.worker_jh.join() {
            Ok(r) => r,
            Err(_) => Err(WorkerError::WorkerPanicked),
        }
    }
}

impl From<SendError<WorkerSignal>> for WorkerError {
    fn from(e: SendError<WorkerSignal>) -> Self {
        Self::SendError(e.0)
    }
}

impl From<RecvError> for WorkerError {
    fn from(_: RecvError) -> Self {
        Self::RecvError
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn worker_thread(
    mut engine: OgmEngine,
    publisher: GridPublisher,
    main_sender: Sender<WorkerSignal>,
    main_reciever: Receiver<WorkerSignal>,
) -> Result<(), WorkerError> {
    // Wait for commands from main
    while let Ok(signal) = main_reciever.recv() {
        match signal {
            WorkerSignal::Stop => break,
            WorkerSignal::NewClouds(input) => {
                let reply = match engine.proc(&input) {
                    Ok((CycleOutcome::Published(snapshot), report)) => {
                        match publisher.to_msg(&snapshot) {
                            Ok(msg) => WorkerSignal::Snapshot(Box::new(msg), Box::new(report)),
                            Err(e) => WorkerSignal::Error(Box::new(WorkerError::PublishError(e))),
                        }
                    }
                    Ok((CycleOutcome::Skipped(e), _)) => WorkerSignal::Skipped(e),
                    Ok((CycleOutcome::Cancelled, _)) => WorkerSignal::Cancelled,
                    Err(e) => WorkerSignal::Error(Box::new(WorkerError::OgmError(e))),
                };

                main_sender.send(reply)?;
            }
            s => warn!("OGM worker ignoring unexpected signal {:?}", s),
        }
    }

    debug!("OGM worker exiting after {} cycles", engine.num_cycles());

    Ok(())
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        loc::{Pose, StaticTransforms},
        params::test::test_params,
        publisher::PublishMode,
    };
    use chrono::{TimeZone, Utc};
    use comms_if::{eqpt::lidar::PointCloud, map::OCCUPIED};
    use nalgebra::Point3;

    fn input(frame_id: &str, ms: i64, x: f32) -> CycleInput {
        let cloud = PointCloud {
            timestamp: Utc.timestamp_millis(1_600_000_000_000 + ms),
            frame_id: frame_id.to_string(),
            points: vec![Point3::new(x, 0.0, 0.0)],
        };

        CycleInput {
            raw: cloud.clone(),
            obstacle: PointCloud {
                points: vec![],
                ..cloud
            },
        }
    }

    fn spawn(name: &str) -> EngineWorker {
        let params = test_params();
        let transforms =
            StaticTransforms::new().with("lidar", Pose::from_xy_heading(0.5, 0.5, 0.0));
        let engine = OgmEngine::new(params.clone(), Box::new(transforms)).unwrap();

        EngineWorker::spawn(
            name,
            engine,
            GridPublisher::new(PublishMode::TriState, &params.updater),
        )
        .unwrap()
    }

    #[test]
    fn test_replies_in_order() {
        let worker = spawn("order");

        worker.send_clouds(input("lidar", 0, 3.0)).unwrap();
        worker.send_clouds(input("radar", 100, 3.0)).unwrap();
        worker.send_clouds(input("lidar", 200, 5.0)).unwrap();

        match worker.recv().unwrap() {
            WorkerSignal::Snapshot(msg, report) => {
                assert_eq!(report.cycle, 0);
                assert_eq!(msg.cell(3, 0), Some(OCCUPIED));
                assert_eq!(msg.timestamp, Utc.timestamp_millis(1_600_000_000_000));
            }
            s => panic!("Expected a snapshot, got {:?}", s),
        }

        assert!(matches!(
            worker.recv().unwrap(),
            WorkerSignal::Skipped(LookupError::UnknownFrame(_))
        ));

        match worker.recv().unwrap() {
            WorkerSignal::Snapshot(msg, report) => {
                assert_eq!(report.cycle, 2);
                assert_eq!(msg.cell(5, 0), Some(OCCUPIED));
            }
            s => panic!("Expected a snapshot, got {:?}", s),
        }

        worker.stop().unwrap();
    }

    #[test]
    fn test_independent_workers() {
        let a = spawn("a");
        let b = spawn("b");

        a.send_clouds(input("lidar", 0, 3.0)).unwrap();
        b.send_clouds(input("lidar", 0, 6.0)).unwrap();

        let cells = |w: &EngineWorker| match w.recv().unwrap() {
            WorkerSignal::Snapshot(msg, _) => (msg.cell(3, 0), msg.cell(6, 0)),
            s => panic!("Expected a snapshot, got {:?}", s),
        };

        assert_eq!(cells(&a), (Some(OCCUPIED), Some(-1)));
        assert_eq!(cells(&b).1, Some(OCCUPIED));

        a.stop().unwrap();
        b.stop().unwrap();
    }

    #[test]
    fn test_cancel_next_cycle() {
        let worker = spawn("cancel");

        worker.cancel();
        worker.send_clouds(input("lidar", 0, 3.0)).unwrap();

        assert!(matches!(worker.recv().unwrap(), WorkerSignal::Cancelled));
        assert!(worker.try_recv().unwrap().is_none());

        worker.stop().unwrap();
    }
}
