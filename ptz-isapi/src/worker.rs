use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use osprey_types::{CameraMotion, PtzConfig, PtzCommand, PtzPose, ShutdownFlag, SoftLimits};

use crate::client::IsapiClient;
use crate::state::{CameraStateMachine, PollOutcome};
use crate::Result;

/// How long the startup home move may take before we go live anyway.
const HOME_MOVE_TIMEOUT: Duration = Duration::from_secs(15);
/// A stalled move is declared after this long without pose progress.
const STALL_TIMEOUT: Duration = Duration::from_secs(3);
/// Command queue depth; the tracker proposes at frame rate but the worker
/// collapses proposals into one pending slot anyway.
const COMMAND_QUEUE: usize = 32;

type ArrivalCallback = Box<dyn Fn(&PtzPose) + Send + Sync>;

struct SharedState {
    pose: RwLock<PtzPose>,
    motion: RwLock<CameraMotion>,
    callbacks: Mutex<Vec<ArrivalCallback>>,
    last_error: Mutex<Option<String>>,
}

/// Cheap-to-clone handle to the PTZ worker.
///
/// The worker is the single writer of the pose cache; everyone else reads
/// snapshots through this handle.
#[derive(Clone)]
pub struct PtzHandle {
    cmd_tx: mpsc::Sender<PtzCommand>,
    shared: Arc<SharedState>,
}

impl PtzHandle {
    /// Queue a command without blocking. Returns false when the worker is
    /// saturated or gone; the next tracker tick will propose again, so
    /// nothing is lost.
    pub fn submit(&self, cmd: PtzCommand) -> bool {
        self.cmd_tx.try_send(cmd).is_ok()
    }

    pub fn current_pose(&self) -> PtzPose {
        *self.shared.pose.read().expect("pose lock")
    }

    pub fn motion(&self) -> CameraMotion {
        *self.shared.motion.read().expect("motion lock")
    }

    /// Register a callback fired exactly once per arrival.
    pub fn on_arrival<F>(&self, f: F)
    where
        F: Fn(&PtzPose) + Send + Sync + 'static,
    {
        self.shared
            .callbacks
            .lock()
            .expect("callbacks lock")
            .push(Box::new(f));
    }

    /// Most recent non-fatal controller error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().expect("error lock").clone()
    }
}

/// Connect to the camera, move to the home pose, and spawn the worker task.
pub async fn start(
    cfg: &PtzConfig,
    shutdown: ShutdownFlag,
) -> Result<(PtzHandle, tokio::task::JoinHandle<()>)> {
    let client = IsapiClient::new(cfg)?;
    let limits = cfg.soft_limits;

    let initial = client.get_status().await?;
    info!(pose = %initial, "camera reachable");

    let home = limits.clamp_pose(cfg.home_pose).quantize();
    client.put_absolute(&home).await?;
    let pose = wait_for_pose(&client, &home, cfg).await;
    info!(pose = %pose, "home position taken");

    let shared = Arc::new(SharedState {
        pose: RwLock::new(pose),
        motion: RwLock::new(CameraMotion::Idle),
        callbacks: Mutex::new(Vec::new()),
        last_error: Mutex::new(None),
    });
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
    let handle = PtzHandle {
        cmd_tx,
        shared: shared.clone(),
    };

    let join = tokio::spawn(worker_loop(
        client,
        cfg.clone(),
        limits,
        home,
        shared,
        cmd_rx,
        shutdown,
    ));

    Ok((handle, join))
}

async fn wait_for_pose(client: &IsapiClient, target: &PtzPose, cfg: &PtzConfig) -> PtzPose {
    let deadline = Instant::now() + HOME_MOVE_TIMEOUT;
    let mut last = *target;
    while Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(cfg.poll_interval_msec)).await;
        match client.get_status().await {
            Ok(pose) => {
                last = pose;
                if pose.within(target, cfg.arrival_tolerance) {
                    return pose;
                }
            }
            Err(e) => warn!("status poll during home move failed: {e}"),
        }
    }
    warn!("home move did not settle in time, continuing");
    last
}

async fn worker_loop(
    client: IsapiClient,
    cfg: PtzConfig,
    limits: SoftLimits,
    home: PtzPose,
    shared: Arc<SharedState>,
    mut cmd_rx: mpsc::Receiver<PtzCommand>,
    shutdown: ShutdownFlag,
) {
    let cooldown = Duration::from_millis(cfg.cmd_cooldown_msec);
    let mut poll = tokio::time::interval(Duration::from_millis(cfg.poll_interval_msec));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut sm = CameraStateMachine::new(cfg.arrival_tolerance, STALL_TIMEOUT);
    // Last-writer-wins slot for commands arriving inside the cooldown.
    let mut pending: Option<PtzPose> = None;
    let mut last_sent: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = poll.tick() => {
                if shutdown.is_set() {
                    debug!("ptz worker observed shutdown");
                    break;
                }
                match client.get_status().await {
                    Ok(pose) => {
                        *shared.pose.write().expect("pose lock") = pose;
                        match sm.on_poll(pose, Instant::now()) {
                            PollOutcome::NoChange => {}
                            PollOutcome::Arrived(pose) => {
                                debug!(%pose, "arrived");
                                fire_arrival(&shared, &pose);
                            }
                            PollOutcome::NeedResend(target) => {
                                warn!(%target, "pose not advancing, resending");
                                send(&client, &shared, &mut sm, &mut last_sent, target).await;
                            }
                            PollOutcome::Stalled(pose) => {
                                record_error(
                                    &shared,
                                    format!("camera stalled at {pose} and gave up"),
                                );
                            }
                        }
                        *shared.motion.write().expect("motion lock") = sm.motion();
                    }
                    Err(e) => {
                        record_error(&shared, format!("status poll failed: {e}"));
                    }
                }
                flush_pending(&client, &shared, &mut sm, &mut pending, &mut last_sent, cooldown)
                    .await;
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let target = match cmd {
                    PtzCommand::AbsolutePosition { target, reason } => {
                        debug!(%target, %reason, "command received");
                        target
                    }
                    PtzCommand::Stop => {
                        // Commanding the current pose halts the move.
                        *shared.pose.read().expect("pose lock")
                    }
                    PtzCommand::Recenter => home,
                };
                let target = limits.clamp_pose(target).quantize();
                if sm.is_duplicate(&target) {
                    debug!(%target, "dropping duplicate of in-flight target");
                } else {
                    pending = Some(target);
                    flush_pending(&client, &shared, &mut sm, &mut pending, &mut last_sent, cooldown)
                        .await;
                }
            }
        }
    }
}

async fn flush_pending(
    client: &IsapiClient,
    shared: &Arc<SharedState>,
    sm: &mut CameraStateMachine,
    pending: &mut Option<PtzPose>,
    last_sent: &mut Option<Instant>,
    cooldown: Duration,
) {
    let ready = match *last_sent {
        Some(t) => t.elapsed() >= cooldown,
        None => true,
    };
    if !ready {
        return;
    }
    if let Some(target) = pending.take() {
        send(client, shared, sm, last_sent, target).await;
        *shared.motion.write().expect("motion lock") = sm.motion();
    }
}

async fn send(
    client: &IsapiClient,
    shared: &Arc<SharedState>,
    sm: &mut CameraStateMachine,
    last_sent: &mut Option<Instant>,
    target: PtzPose,
) {
    match client.put_absolute(&target).await {
        Ok(()) => {
            sm.command_sent(target, Instant::now());
            *last_sent = Some(Instant::now());
        }
        Err(e) => {
            record_error(shared, format!("absolute command failed: {e}"));
        }
    }
}

fn fire_arrival(shared: &Arc<SharedState>, pose: &PtzPose) {
    let callbacks = shared.callbacks.lock().expect("callbacks lock");
    for cb in callbacks.iter() {
        cb(pose);
    }
}

fn record_error(shared: &Arc<SharedState>, msg: String) {
    warn!("{msg}");
    *shared.last_error.lock().expect("error lock") = Some(msg);
}
