//! Player session - reconciles the desired idle/action mode with the
//! state the MPV process actually reports.
//!
//! One `PlayerSession` owns the player for the whole process. Every
//! command sequence (HTTP handlers and monitor tasks alike) runs under a
//! single mutex, so transitions are strictly ordered instead of
//! last-write-wins. Two background tasks watch the player: a crash
//! monitor that respawns it within a restart budget, and a playback
//! monitor that returns to the idle clip when an action clip finishes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::catalog::VideoCatalog;
use crate::config::Config;
use crate::mpv::{MpvClient, MpvError, PlaybackState};

/// Two-state playback mode. Action carries the clip id (for health
/// reporting) and a generation stamp so a stale end-of-clip observation
/// cannot undo a newer transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Idle,
  Action { video_id: u32, generation: u64 },
}

impl Mode {
  pub fn label(&self) -> &'static str {
    match self {
      Mode::Idle => "idle",
      Mode::Action { .. } => "action",
    }
  }
}

/// Mode state machine: IDLE <-> ACTION with generation stamping.
#[derive(Debug)]
struct ModeTracker {
  mode: Mode,
  next_generation: u64,
}

impl ModeTracker {
  fn new() -> Self {
    Self {
      mode: Mode::Idle,
      next_generation: 1,
    }
  }

  /// IDLE -> ACTION, or ACTION -> ACTION (supersede). Returns the
  /// generation stamped on this transition.
  fn begin_action(&mut self, video_id: u32) -> u64 {
    let generation = self.next_generation;
    self.next_generation += 1;
    self.mode = Mode::Action {
      video_id,
      generation,
    };
    generation
  }

  /// Unconditional transition to IDLE (external close). Idempotent.
  fn to_idle(&mut self) {
    self.mode = Mode::Idle;
  }

  /// Internal completion of an action clip. Only applies when the mode
  /// is still the action stamped with `generation`; a stale completion
  /// (raced by a newer begin_action or close) is refused.
  fn complete(&mut self, generation: u64) -> bool {
    match self.mode {
      Mode::Action { generation: g, .. } if g == generation => {
        self.mode = Mode::Idle;
        true
      }
      _ => false,
    }
  }

  fn current(&self) -> Mode {
    self.mode
  }
}

/// Rolling-window restart budget for the crash monitor.
#[derive(Debug)]
struct RestartBudget {
  max: u32,
  window: Duration,
  events: VecDeque<Instant>,
}

impl RestartBudget {
  fn new(max: u32, window: Duration) -> Self {
    Self {
      max,
      window,
      events: VecDeque::new(),
    }
  }

  /// Record a restart attempt at `now`. Returns false once `max`
  /// attempts have landed inside the rolling window.
  fn try_consume(&mut self, now: Instant) -> bool {
    while let Some(front) = self.events.front() {
      if now.duration_since(*front) > self.window {
        self.events.pop_front();
      } else {
        break;
      }
    }

    if self.events.len() as u32 >= self.max {
      return false;
    }
    self.events.push_back(now);
    true
  }
}

/// Mutable session state behind the single session mutex.
struct SessionState {
  tracker: ModeTracker,
  budget: RestartBudget,
  degraded: bool,
}

/// Snapshot returned to the health endpoint.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
  pub degraded: bool,
  pub mode: &'static str,
  pub player_alive: bool,
}

/// The one player session for this process.
pub struct PlayerSession {
  mpv: Arc<MpvClient>,
  catalog: VideoCatalog,
  state: Mutex<SessionState>,
  shutdown: CancellationToken,
  playback_poll: Duration,
  crash_poll: Duration,
}

impl PlayerSession {
  pub fn new(mpv: MpvClient, catalog: VideoCatalog, config: &Config) -> Arc<Self> {
    Arc::new(Self {
      mpv: Arc::new(mpv),
      catalog,
      state: Mutex::new(SessionState {
        tracker: ModeTracker::new(),
        budget: RestartBudget::new(
          config.max_restarts,
          Duration::from_secs(config.restart_window_secs),
        ),
        degraded: false,
      }),
      shutdown: CancellationToken::new(),
      playback_poll: Duration::from_secs(config.playback_poll_secs),
      crash_poll: Duration::from_secs(config.crash_poll_secs),
    })
  }

  /// Start the player, put it on the idle clip, and spawn the monitor
  /// tasks. Failure here is fatal; once running, the crash monitor owns
  /// recovery.
  pub async fn start(self: &Arc<Self>) -> Result<(), MpvError> {
    self.mpv.start().await?;

    {
      let mut state = self.state.lock().await;
      self.apply_idle(&mut state).await;
    }

    self.spawn_crash_monitor();
    self.spawn_event_listener();
    self.spawn_playback_poller();
    Ok(())
  }

  /// Stop the monitors and tear the player down.
  pub async fn stop(&self) {
    self.shutdown.cancel();
    let _state = self.state.lock().await;
    self.mpv.quit().await;
  }

  /// IDLE -> ACTION: play a one-shot clip with sound. Unknown ids are a
  /// logged no-op (the caller still reports success, per the webhook
  /// contract). A second call supersedes the first.
  pub async fn play_action(&self, video_id: u32) {
    let mut state = self.state.lock().await;

    if state.degraded {
      log::warn!("Ignoring changeVideo({}): player is degraded", video_id);
      return;
    }

    let path = match self.catalog.resolve(video_id) {
      Some(p) => p.display().to_string(),
      None => {
        log::warn!("Unknown video-id {}, ignoring request", video_id);
        return;
      }
    };

    log::info!("Playing action video {}: {}", video_id, path);

    if let Err(e) = self.mpv.playlist_clear().await {
      log::error!("playlist_clear failed: {}", e);
    }
    // Only commit the mode change once the clip is actually loaded
    if let Err(e) = self.mpv.loadfile_replace(&path).await {
      log::error!("Failed to load action video {}: {}", video_id, e);
      return;
    }
    for result in [
      self.mpv.set_loop_file(false).await,
      self.mpv.set_mute(false).await,
      self.mpv.set_pause(false).await,
    ] {
      if let Err(e) = result {
        log::error!("Failed to set playback property: {}", e);
      }
    }

    let generation = state.tracker.begin_action(video_id);
    log::debug!("Mode -> action (video {}, generation {})", video_id, generation);
  }

  /// ACTION -> IDLE (external close). Redundant closes are harmless:
  /// the idle clip is simply reloaded.
  pub async fn return_to_idle(&self) {
    let mut state = self.state.lock().await;
    if state.degraded {
      log::warn!("Ignoring close: player is degraded");
      return;
    }
    self.apply_idle(&mut state).await;
  }

  /// Toggle pause without touching the mode or the loaded clip.
  pub async fn toggle_pause(&self) {
    let state = self.state.lock().await;
    if state.degraded {
      log::warn!("Ignoring pause: player is degraded");
      return;
    }
    if let Err(e) = self.mpv.cycle_pause().await {
      log::error!("Failed to toggle pause: {}", e);
    }
  }

  /// Health snapshot. Does not round-trip through the player; liveness
  /// is the tracked process handle.
  pub async fn health(&self) -> HealthSnapshot {
    let state = self.state.lock().await;
    HealthSnapshot {
      degraded: state.degraded,
      mode: state.tracker.current().label(),
      player_alive: self.mpv.is_running(),
    }
  }

  /// Load the idle clip: looped, muted, unpaused. Shared by startup,
  /// close requests, end-of-clip completion and crash recovery.
  async fn apply_idle(&self, state: &mut SessionState) {
    let idle = self.catalog.idle().display().to_string();
    log::info!("Loading idle video: {}", idle);

    if let Err(e) = self.mpv.playlist_clear().await {
      log::error!("playlist_clear failed: {}", e);
    }
    if let Err(e) = self.mpv.loadfile_replace(&idle).await {
      log::error!("Failed to load idle video: {}", e);
    }
    for result in [
      self.mpv.set_loop_file(true).await,
      self.mpv.set_mute(true).await,
      self.mpv.set_pause(false).await,
    ] {
      if let Err(e) = result {
        log::error!("Failed to set playback property: {}", e);
      }
    }

    state.tracker.to_idle();
  }

  /// If an action clip has finished, transition back to idle.
  ///
  /// Called from the end-file event path and the poll fallback. The
  /// status re-check is deliberate, not redundant: an end-file event
  /// cannot be attributed to a generation, so a stale eof for a
  /// superseded clip would idle the newer clip if trusted directly.
  /// Reading `idle-active` answers "is anything playing *now*"; if the
  /// read lands before mpv has entered idle, the poll fallback picks
  /// the transition up one tick later. The status is read outside the
  /// session lock (it costs an IPC round trip); the generation stamp
  /// makes an observation raced by a newer transition harmless.
  async fn check_action_finished(&self) {
    let generation = {
      let state = self.state.lock().await;
      match state.tracker.current() {
        Mode::Action { generation, .. } => generation,
        Mode::Idle => return,
      }
    };

    let status = match self.mpv.playback_status().await {
      Ok(s) => s,
      Err(e) => {
        // Skip this cycle; the next event or poll tick retries
        log::debug!("Playback status unavailable: {}", e);
        return;
      }
    };

    if status.state != PlaybackState::Stopped {
      return;
    }

    let mut state = self.state.lock().await;
    if state.tracker.complete(generation) {
      log::info!("Action video finished, returning to idle");
      self.apply_idle(&mut state).await;
    } else {
      log::debug!("Stale end-of-clip observation (generation {}), ignoring", generation);
    }
  }

  /// Crash monitor: respawn the player when it exits, within the
  /// restart budget; past the budget, go degraded and stop respawning.
  fn spawn_crash_monitor(self: &Arc<Self>) {
    let session = self.clone();
    tokio::spawn(async move {
      log::debug!("Crash monitor started ({:?} period)", session.crash_poll);
      loop {
        tokio::select! {
          _ = session.shutdown.cancelled() => break,
          _ = tokio::time::sleep(session.crash_poll) => {}
        }

        let mut state = session.state.lock().await;
        if state.degraded || session.mpv.is_running() {
          continue;
        }

        if !state.budget.try_consume(Instant::now()) {
          log::error!(
            "MPV crash loop: restart budget exhausted, entering degraded state"
          );
          state.degraded = true;
          continue;
        }

        log::warn!("MPV process died, restarting");
        match session.mpv.start().await {
          Ok(()) => session.apply_idle(&mut state).await,
          Err(e) => log::error!("MPV restart failed: {}", e),
        }
      }
      log::debug!("Crash monitor stopped");
    });
  }

  /// Event listener: the primary end-of-clip signal is MPV's end-file
  /// event with reason "eof". The receiver dies with each player
  /// process, so the loop re-acquires it after restarts.
  fn spawn_event_listener(self: &Arc<Self>) {
    let session = self.clone();
    tokio::spawn(async move {
      log::debug!("MPV event listener started");
      loop {
        if session.shutdown.is_cancelled() {
          break;
        }

        let event_rx = match session.mpv.events() {
          Some(rx) => rx,
          None => {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
          }
        };

        loop {
          tokio::select! {
            _ = session.shutdown.cancelled() => return,
            event = event_rx.recv() => {
              match event {
                Ok(event) => {
                  if event.is_natural_end() {
                    session.check_action_finished().await;
                  }
                }
                // Channel closed: player (or its connection) went away
                Err(_) => break,
              }
            }
          }
        }

        log::debug!("MPV event channel closed, waiting for reconnect");
        tokio::time::sleep(Duration::from_secs(1)).await;
      }
      log::debug!("MPV event listener stopped");
    });
  }

  /// Poll fallback for end-of-clip detection, in case the end-file
  /// event is missed across a reconnect.
  fn spawn_playback_poller(self: &Arc<Self>) {
    let session = self.clone();
    tokio::spawn(async move {
      log::debug!("Playback poller started ({:?} period)", session.playback_poll);
      loop {
        tokio::select! {
          _ = session.shutdown.cancelled() => break,
          _ = tokio::time::sleep(session.playback_poll) => {}
        }
        session.check_action_finished().await;
      }
      log::debug!("Playback poller stopped");
    });
  }
}

#[cfg(test)]
impl PlayerSession {
  /// Flip the degraded flag the way the crash monitor does once the
  /// restart budget runs out.
  pub(crate) async fn force_degraded(&self) {
    self.state.lock().await.degraded = true;
  }

  /// Put the session in action mode without a player round trip.
  pub(crate) async fn force_action(&self, video_id: u32) -> u64 {
    self.state.lock().await.tracker.begin_action(video_id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mpv::MpvClient;
  use std::collections::BTreeMap;
  use std::fs::File;
  use tempfile::TempDir;

  #[test]
  fn test_begin_action_stamps_increasing_generations() {
    let mut tracker = ModeTracker::new();
    let g1 = tracker.begin_action(1);
    let g2 = tracker.begin_action(2);
    assert!(g2 > g1);
    match tracker.current() {
      Mode::Action { video_id, .. } => assert_eq!(video_id, 2),
      _ => panic!("Expected action mode"),
    }
  }

  #[test]
  fn test_stale_completion_is_refused() {
    let mut tracker = ModeTracker::new();
    let g1 = tracker.begin_action(1);
    // A second button press supersedes the first clip
    let g2 = tracker.begin_action(2);
    assert!(!tracker.complete(g1));
    assert_eq!(tracker.current().label(), "action");
    assert!(tracker.complete(g2));
    assert_eq!(tracker.current(), Mode::Idle);
  }

  #[test]
  fn test_completion_after_close_is_refused() {
    let mut tracker = ModeTracker::new();
    let g = tracker.begin_action(3);
    tracker.to_idle();
    assert!(!tracker.complete(g));
    assert_eq!(tracker.current(), Mode::Idle);
  }

  #[test]
  fn test_close_is_idempotent() {
    let mut tracker = ModeTracker::new();
    tracker.begin_action(1);
    tracker.to_idle();
    tracker.to_idle();
    assert_eq!(tracker.current(), Mode::Idle);
  }

  #[test]
  fn test_restart_budget_exhaustion() {
    let mut budget = RestartBudget::new(3, Duration::from_secs(60));
    let base = Instant::now();
    assert!(budget.try_consume(base));
    assert!(budget.try_consume(base + Duration::from_secs(1)));
    assert!(budget.try_consume(base + Duration::from_secs(2)));
    assert!(!budget.try_consume(base + Duration::from_secs(3)));
  }

  #[test]
  fn test_restart_budget_window_expiry() {
    let mut budget = RestartBudget::new(2, Duration::from_secs(10));
    let base = Instant::now();
    assert!(budget.try_consume(base));
    assert!(budget.try_consume(base + Duration::from_secs(1)));
    assert!(!budget.try_consume(base + Duration::from_secs(2)));
    // Both earlier restarts age out of the window
    assert!(budget.try_consume(base + Duration::from_secs(20)));
  }

  #[test]
  fn test_mode_labels() {
    let mut tracker = ModeTracker::new();
    assert_eq!(tracker.current().label(), "idle");
    tracker.begin_action(1);
    assert_eq!(tracker.current().label(), "action");
  }

  /// Session over a real catalog but a never-started player: IPC calls
  /// fail fast and get swallowed, so mode bookkeeping is observable on
  /// its own.
  fn test_session(dir: &TempDir) -> Arc<PlayerSession> {
    let idle = dir.path().join("idle.mp4");
    File::create(&idle).unwrap();
    let one = dir.path().join("one.mp4");
    File::create(&one).unwrap();

    let mut videos = BTreeMap::new();
    videos.insert(1, one);
    let catalog = VideoCatalog::new(idle, videos).unwrap();

    let config = Config::default();
    let mpv = MpvClient::new(None, "/tmp/flicvid-session-test.sock".to_string(), Vec::new());
    PlayerSession::new(mpv, catalog, &config)
  }

  #[tokio::test]
  async fn test_degraded_session_reports_and_rejects() {
    let dir = TempDir::new().unwrap();
    let session = test_session(&dir);

    assert!(!session.health().await.degraded);
    session.force_degraded().await;

    let snapshot = session.health().await;
    assert!(snapshot.degraded);
    assert_eq!(snapshot.mode, "idle");

    // Requests against a degraded player are no-ops
    session.play_action(1).await;
    assert_eq!(session.health().await.mode, "idle");
    session.toggle_pause().await;
    assert!(session.health().await.degraded);

    // A non-degraded close resets the mode tracker even when the
    // player is unreachable; a degraded one must not touch it
    session.force_action(1).await;
    session.return_to_idle().await;
    assert_eq!(session.health().await.mode, "action");
  }

  #[tokio::test]
  async fn test_toggle_pause_leaves_mode_unchanged() {
    let dir = TempDir::new().unwrap();
    let session = test_session(&dir);

    session.toggle_pause().await;
    assert_eq!(session.health().await.mode, "idle");

    session.force_action(2).await;
    session.toggle_pause().await;
    assert_eq!(session.health().await.mode, "action");
  }

  #[tokio::test]
  async fn test_unknown_id_leaves_action_mode_unchanged() {
    let dir = TempDir::new().unwrap();
    let session = test_session(&dir);

    session.force_action(1).await;
    session.play_action(99).await;
    assert_eq!(session.health().await.mode, "action");
  }
}
