use anyhow::{Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use crossbeam_channel::{Receiver, Sender, after, never, select, unbounded};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::actions::{Action, ActionBackend, ActionRegistry};
use crate::classifier::{self, Classifier, TrainOutcome};
use crate::config::AppConfig;
use crate::cursor::{CursorGestureEngine, CursorSettings, CursorTuning, PointerBackend};
use crate::dispatcher::ActionDispatcher;
use crate::features::feature_vector;
use crate::hub::{BroadcastHub, ObserverId};
use crate::pipeline::source::{CapturedFrame, FrameSource, SourceFactory};
use crate::pipeline::workers::WorkerPool;
use crate::protocol::{Command, Event};
use crate::recorder::SampleRecorder;
use crate::router::{self, Mode, ModeFlags};
use crate::storage::Storage;
use crate::types::{Detection, GestureMap, Landmarks};

/// Delay before re-polling a source that had no frame ready.
const NO_FRAME_RETRY: Duration = Duration::from_millis(10);

/// Messages driving the orchestration thread: observer lifecycle, decoded
/// client commands, and shutdown.
pub enum ControlMsg {
    Attach { id: ObserverId, tx: Sender<String> },
    Detach { id: ObserverId },
    Command { origin: ObserverId, command: Command },
    Shutdown,
}

/// Results handed back from the worker pool. Progress callbacks never touch
/// broadcast state directly; they cross back through this channel so the
/// orchestration thread stays the only writer.
enum WorkerEvent {
    Frame {
        seq: u64,
        result: Result<Option<CapturedFrame>>,
    },
    TrainProgress {
        progress: u8,
        accuracy: f32,
        status: String,
    },
    TrainComplete {
        outcome: TrainOutcome,
    },
}

/// Injected collaborator capabilities.
pub struct ServiceDeps {
    pub source_factory: SourceFactory,
    pub actions: Box<dyn ActionBackend>,
    pub pointer: Box<dyn PointerBackend>,
}

/// Handle owned by transports and tests; dropping every handle shuts the
/// service loop down.
#[derive(Clone)]
pub struct ServiceHandle {
    control: Sender<ControlMsg>,
}

impl ServiceHandle {
    pub fn send(&self, msg: ControlMsg) {
        if self.control.send(msg).is_err() {
            log::warn!("service loop is gone, dropping control message");
        }
    }

    pub fn command(&self, origin: ObserverId, command: Command) {
        self.send(ControlMsg::Command { origin, command });
    }

    pub fn shutdown(&self) {
        self.send(ControlMsg::Shutdown);
    }
}

/// The orchestration core: one cooperative thread drives frame pacing, mode
/// arbitration, action dispatch, broadcasting and command handling, with a
/// bounded worker pool for the blocking capture and training steps.
pub struct Service {
    config: AppConfig,
    storage: Storage,
    hub: BroadcastHub,
    classifier: Classifier,
    recorder: SampleRecorder,
    dispatcher: ActionDispatcher,
    registry: ActionRegistry,
    engine: CursorGestureEngine,
    pointer: Box<dyn PointerBackend>,
    gestures: GestureMap,
    confidence_threshold: f32,
    cursor_mode: bool,

    source_factory: SourceFactory,
    session: Option<Arc<Mutex<Box<dyn FrameSource>>>>,
    camera_on: bool,
    capture_in_flight: bool,
    capture_seq: u64,
    cycle_start: Instant,
    frame_interval: Duration,
    tick: Receiver<Instant>,

    training: bool,
    pool: WorkerPool,
    worker_tx: Sender<WorkerEvent>,
    worker_rx: Receiver<WorkerEvent>,
}

impl Service {
    pub fn new(config: AppConfig, deps: ServiceDeps) -> Result<Self> {
        let storage = Storage::new(config.data_dir.clone());
        let gestures = storage.load_gestures();
        let classifier = Classifier::load(&storage, config.outlier_distance);

        let mut pointer = deps.pointer;
        let screen = pointer.screen_size();
        let mut engine =
            CursorGestureEngine::new(CursorSettings::default(), CursorTuning::from_config(&config), screen);
        // Re-register persisted cursor-action gestures so they survive a
        // service restart.
        for def in gestures.values() {
            if def.action == Action::CursorAction {
                if let Some(cursor_action) = def.cursor_action {
                    engine.register_custom(def.name.clone(), cursor_action);
                }
            }
        }

        let registry = ActionRegistry::new(deps.actions);
        let dispatcher = ActionDispatcher::new(
            config.buffer_size,
            Duration::from_secs_f64(config.cooldown_secs),
        );
        let pool = WorkerPool::new(config.worker_threads.max(1))?;
        let (worker_tx, worker_rx) = unbounded();
        let frame_interval = Duration::from_secs_f64(1.0 / config.target_fps.max(1) as f64);
        let confidence_threshold = config.confidence_threshold;

        Ok(Self {
            config,
            storage,
            hub: BroadcastHub::new(),
            classifier,
            recorder: SampleRecorder::new(),
            dispatcher,
            registry,
            engine,
            pointer,
            gestures,
            confidence_threshold,
            cursor_mode: false,
            source_factory: deps.source_factory,
            session: None,
            camera_on: false,
            capture_in_flight: false,
            capture_seq: 0,
            cycle_start: Instant::now(),
            frame_interval,
            tick: never(),
            training: false,
            pool,
            worker_tx,
            worker_rx,
        })
    }

    pub fn spawn(config: AppConfig, deps: ServiceDeps) -> Result<(ServiceHandle, JoinHandle<()>)> {
        let service = Service::new(config, deps)?;
        let (control_tx, control_rx) = unbounded();
        let join = thread::Builder::new()
            .name("service".to_string())
            .spawn(move || service.run(control_rx))
            .map_err(|e| anyhow!("failed to spawn service thread: {e}"))?;
        Ok((ServiceHandle { control: control_tx }, join))
    }

    pub fn run(mut self, control_rx: Receiver<ControlMsg>) {
        log::info!("service loop started");
        let worker_rx = self.worker_rx.clone();
        loop {
            let tick = self.tick.clone();
            select! {
                recv(control_rx) -> msg => match msg {
                    Ok(ControlMsg::Shutdown) | Err(_) => break,
                    Ok(msg) => self.handle_control(msg),
                },
                recv(worker_rx) -> event => {
                    if let Ok(event) = event {
                        self.handle_worker_event(event);
                    }
                },
                recv(tick) -> _ => {
                    self.tick = never();
                    self.begin_capture();
                },
            }
        }
        if self.camera_on || self.session.is_some() {
            self.close_camera();
        }
        log::info!("service loop stopped");
    }

    fn handle_control(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::Attach { id, tx } => {
                self.hub.attach(id, tx);
                let snapshot = Event::Connected {
                    gestures: self.gestures.clone(),
                    camera_on: self.camera_on,
                    model_loaded: self.classifier.model_loaded(),
                    accuracy: round1(self.classifier.accuracy() * 100.0),
                };
                self.hub.send_to(id, &snapshot);
            }
            ControlMsg::Detach { id } => self.hub.detach(id),
            ControlMsg::Command { origin, command } => self.handle_command(origin, command),
            ControlMsg::Shutdown => {}
        }
    }

    fn handle_command(&mut self, origin: ObserverId, command: Command) {
        match command {
            Command::CameraStart => {
                // A session that thinks it is still open is forced closed
                // before reopening.
                if self.camera_on || self.session.is_some() {
                    self.close_camera();
                }
                self.open_camera(origin);
            }
            Command::CameraStop => self.close_camera(),
            Command::ToggleCursorMode { enabled } => {
                self.cursor_mode = enabled.unwrap_or(!self.cursor_mode);
                log::info!(
                    "cursor mode {}",
                    if self.cursor_mode { "on" } else { "off" }
                );
                self.hub.broadcast(&Event::CursorModeChanged {
                    enabled: self.cursor_mode,
                });
            }
            Command::UpdateCursorSettings { settings } => {
                let updated = self.engine.apply_settings(settings);
                self.hub
                    .broadcast(&Event::CursorSettingsUpdated { settings: updated });
            }
            Command::AddGesture { id, data } => {
                if data.action == Action::CursorAction {
                    if let Some(cursor_action) = data.cursor_action {
                        self.engine
                            .register_custom(data.name.clone(), cursor_action);
                    }
                }
                self.gestures.insert(id, data);
                self.persist_gestures();
                self.hub.broadcast(&Event::GestureUpdated {
                    gestures: self.gestures.clone(),
                });
            }
            Command::DeleteGesture { id } => {
                if self.gestures.remove(&id).is_some() {
                    self.persist_gestures();
                    if let Err(err) = self.storage.delete_bucket(&id) {
                        log::warn!("failed to delete sample bucket '{id}': {err}");
                    }
                    self.hub.broadcast(&Event::GestureUpdated {
                        gestures: self.gestures.clone(),
                    });
                }
            }
            Command::ToggleGesture { id, active } => {
                if let Some(def) = self.gestures.get_mut(&id) {
                    def.active = active;
                    self.persist_gestures();
                    self.hub.broadcast(&Event::GestureUpdated {
                        gestures: self.gestures.clone(),
                    });
                }
            }
            Command::StartRecording { id, total } => {
                if !self.camera_on {
                    self.open_camera(origin);
                }
                let total = total.unwrap_or(self.config.recording_total);
                match self.recorder.start(&self.storage, &id, total) {
                    Ok(()) => self.hub.broadcast(&Event::RecordingStarted { id, total }),
                    Err(err) => {
                        log::warn!("failed to start recording for '{id}': {err:?}");
                        self.hub.send_to(
                            origin,
                            &Event::Error {
                                message: "Could not start recording".to_string(),
                            },
                        );
                    }
                }
            }
            Command::StopRecording => {
                self.recorder.stop();
                self.hub.broadcast(&Event::RecordingStopped {
                    recorded: self.recorder.recorded(),
                });
            }
            Command::Retrain => self.start_training(),
            Command::GetStats => {
                let total_samples = self
                    .gestures
                    .keys()
                    .map(|gid| self.storage.count_samples(gid))
                    .sum();
                let stats = Event::Stats {
                    accuracy: round1(self.classifier.accuracy() * 100.0),
                    total_gestures: self.gestures.len(),
                    total_samples,
                    model_loaded: self.classifier.model_loaded(),
                };
                self.hub.send_to(origin, &stats);
            }
            Command::UpdateSettings {
                confidence_threshold,
                cooldown,
                buffer_size,
            } => {
                if let Some(percent) = confidence_threshold {
                    self.confidence_threshold = percent / 100.0;
                }
                if let Some(millis) = cooldown {
                    self.dispatcher
                        .set_cooldown(Duration::from_secs_f64(millis / 1000.0));
                }
                if let Some(size) = buffer_size {
                    self.dispatcher.set_capacity(size);
                }
                self.hub
                    .send_to(origin, &Event::SettingsUpdated { status: "ok" });
            }
            Command::GetGestures => {
                let event = Event::GestureUpdated {
                    gestures: self.gestures.clone(),
                };
                self.hub.send_to(origin, &event);
            }
            Command::Unknown => log::debug!("ignoring unrecognized command"),
        }
    }

    fn persist_gestures(&self) {
        if let Err(err) = self.storage.save_gestures(&self.gestures) {
            log::warn!("failed to persist gesture table: {err}");
        }
    }

    fn open_camera(&mut self, origin: ObserverId) {
        match (self.source_factory)() {
            Ok(source) => {
                self.session = Some(Arc::new(Mutex::new(source)));
                self.camera_on = true;
                self.capture_seq += 1;
                log::info!("camera started");
                self.hub.broadcast(&Event::CameraStatus { active: true });
                self.begin_capture();
            }
            Err(err) => {
                log::warn!("could not open camera: {err:?}");
                self.hub.send_to(
                    origin,
                    &Event::Error {
                        message: "Could not open camera".to_string(),
                    },
                );
            }
        }
    }

    /// Cooperative stop: clears the run flag, waits out the in-flight
    /// capture within a bounded timeout, then releases the session either
    /// way. Training events arriving during the wait are handled normally.
    fn close_camera(&mut self) {
        self.camera_on = false;
        self.tick = never();
        if self.capture_in_flight {
            let deadline = Instant::now()
                + Duration::from_secs_f64(self.config.camera_close_timeout_secs);
            while self.capture_in_flight {
                match self.worker_rx.recv_deadline(deadline) {
                    Ok(event) => self.handle_worker_event(event),
                    Err(_) => {
                        log::warn!("in-flight capture did not finish before timeout");
                        break;
                    }
                }
            }
        }
        self.session = None;
        self.capture_in_flight = false;
        self.capture_seq += 1;
        self.hub.broadcast(&Event::CameraStatus { active: false });
        log::info!("camera stopped");
    }

    /// Submits the blocking capture step to the worker pool. At most one
    /// capture is in flight, which keeps frames in strict capture order.
    fn begin_capture(&mut self) {
        if !self.camera_on || self.capture_in_flight {
            return;
        }
        let Some(session) = self.session.clone() else {
            return;
        };
        self.cycle_start = Instant::now();
        self.capture_in_flight = true;
        let seq = self.capture_seq;
        let tx = self.worker_tx.clone();
        self.pool.submit(move || {
            let result = match session.lock() {
                Ok(mut source) => source.next_frame(),
                Err(_) => Err(anyhow!("capture session mutex poisoned")),
            };
            let _ = tx.send(WorkerEvent::Frame { seq, result });
        });
    }

    fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Frame { seq, result } => self.on_frame_result(seq, result),
            WorkerEvent::TrainProgress {
                progress,
                accuracy,
                status,
            } => {
                self.hub.broadcast(&Event::TrainProgress {
                    progress,
                    accuracy: round1(accuracy * 100.0),
                    status,
                });
            }
            WorkerEvent::TrainComplete { outcome } => {
                self.training = false;
                let accuracy = outcome.accuracy;
                if let Some(artifact) = outcome.artifact {
                    self.classifier.install(artifact);
                }
                self.hub.broadcast(&Event::TrainComplete {
                    accuracy: round1(accuracy * 100.0),
                });
            }
        }
    }

    fn on_frame_result(&mut self, seq: u64, result: Result<Option<CapturedFrame>>) {
        self.capture_in_flight = false;
        if seq != self.capture_seq || !self.camera_on {
            // Straggler from a session that has since been closed.
            return;
        }
        match result {
            Ok(Some(frame)) => {
                self.process_frame(frame);
                let elapsed = self.cycle_start.elapsed();
                self.tick = after(self.frame_interval.saturating_sub(elapsed));
            }
            Ok(None) => {
                self.tick = after(NO_FRAME_RETRY);
            }
            Err(err) => {
                log::warn!("frame capture failed: {err:?}");
                self.tick = after(NO_FRAME_RETRY);
            }
        }
    }

    /// One frame through the pipeline: arbitrate the mode, run exactly one
    /// mode action, then broadcast the frame (always) and the detection
    /// (when prediction produced one).
    fn process_frame(&mut self, frame: CapturedFrame) {
        let payload = format!("data:image/jpeg;base64,{}", BASE64.encode(&frame.jpeg));
        let mut detection = None;

        if let Some(landmarks) = frame.landmarks {
            let mode = router::arbitrate(ModeFlags {
                hand_present: true,
                recording_active: self.recorder.active(),
                cursor_mode: self.cursor_mode,
            });
            match mode {
                Mode::Recording => self.run_recording(&landmarks),
                Mode::CursorControl => self.run_cursor(&landmarks),
                Mode::Predicting => detection = self.run_prediction(&landmarks),
                Mode::Idle => {}
            }
        }

        self.hub.broadcast(&Event::Frame {
            frame: payload,
            detection,
        });
    }

    fn run_recording(&mut self, landmarks: &Landmarks) {
        let vector = feature_vector(landmarks);
        let still_active = self.recorder.save(&self.storage, &vector);
        let id = self
            .recorder
            .gesture_id()
            .unwrap_or_default()
            .to_string();
        self.hub.broadcast(&Event::RecordingProgress {
            id: id.clone(),
            recorded: self.recorder.recorded(),
            total: self.recorder.total(),
            active: still_active,
        });

        // Completed cursor-action gestures become custom cursor triggers.
        if !still_active {
            if let Some(def) = self.gestures.get(&id) {
                if def.action == Action::CursorAction {
                    if let Some(cursor_action) = def.cursor_action {
                        self.engine
                            .register_custom(def.name.clone(), cursor_action);
                    }
                }
            }
        }
    }

    fn run_cursor(&mut self, landmarks: &Landmarks) {
        self.engine.move_cursor(landmarks, &mut *self.pointer);

        // Custom trained gestures take priority over the built-in detectors.
        let vector = feature_vector(landmarks);
        let (label, _) = self.classifier.predict(&vector, self.confidence_threshold);
        let handled = match label {
            Some(label) => self.engine.handle_custom(&label, &mut *self.pointer),
            None => false,
        };
        if !handled {
            self.engine.run_builtins(landmarks, &mut *self.pointer);
        }
    }

    fn run_prediction(&mut self, landmarks: &Landmarks) -> Option<Detection> {
        let vector = feature_vector(landmarks);
        let (label, confidence) = self.classifier.predict(&vector, self.confidence_threshold);
        let label = label?;

        let matched = self
            .gestures
            .iter()
            .find(|(_, def)| def.name == label && def.active);
        let (gesture_id, action) = match matched {
            Some((gid, def)) => (Some(gid.clone()), Some(def.action)),
            None => (None, None),
        };

        let fired = match action {
            Some(action) if action != Action::None => self
                .dispatcher
                .feed(&label, action, &mut self.registry)
                .is_some(),
            _ => false,
        };

        Some(Detection {
            gesture: label,
            gesture_id,
            confidence: round3(confidence),
            action,
            fired,
        })
    }

    fn start_training(&mut self) {
        self.hub.broadcast(&Event::TrainProgress {
            progress: 0,
            accuracy: 0.0,
            status: "Starting...".to_string(),
        });
        if self.training {
            log::warn!("training already in progress, ignoring retrain");
            return;
        }
        self.training = true;

        let storage = self.storage.clone();
        let gestures = self.gestures.clone();
        let optimistic = self.config.optimistic_eval;
        let tx = self.worker_tx.clone();
        self.pool.submit(move || {
            let progress_tx = tx.clone();
            let mut progress = move |progress: u8, accuracy: f32, status: &str| {
                let _ = progress_tx.send(WorkerEvent::TrainProgress {
                    progress,
                    accuracy,
                    status: status.to_string(),
                });
            };
            let outcome = classifier::train(&storage, &gestures, optimistic, &mut progress);
            let _ = tx.send(WorkerEvent::TrainComplete { outcome });
        });
    }
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}
