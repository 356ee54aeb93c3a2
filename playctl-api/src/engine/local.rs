//! In-process reference player
//!
//! A small player model that runs as its own task and is driven over a
//! command channel, the same way an out-of-process engine would be. The
//! binary uses it when no external engine is attached; tests use it to
//! exercise the full command → snapshot → fan-out path.
//!
//! Supported actions: `pause`, `resume`, `toggle`, `next`, `previous`,
//! `setRepeatMode`, `setShuffleMode`, `seek`, `volume`, `playNext`,
//! `addToQueue`.

use async_trait::async_trait;
use playctl_common::{ActionInvocation, Fields};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{EngineError, PlayerEngine, PlayerSnapshot};

/// Repeat modes as reported in `repeatMode`
pub const REPEAT_OFF: i64 = 0;
pub const REPEAT_ALL: i64 = 1;

/// Requests accepted by the player task
#[derive(Debug)]
enum PlayerRequest {
    Command(ActionInvocation),
    Invoke {
        invocation: ActionInvocation,
        reply: oneshot::Sender<Result<Value, EngineError>>,
    },
    Snapshot {
        reply: oneshot::Sender<PlayerSnapshot>,
    },
}

/// Handle to the player task. Cheap to clone; the task ends when the last
/// handle is dropped.
#[derive(Clone)]
pub struct LocalPlayer {
    tx: mpsc::UnboundedSender<PlayerRequest>,
}

impl LocalPlayer {
    /// Spawn the player task with an initial queue of item ids.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(queue: Vec<String>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut model = PlayerModel::new(queue);

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                match request {
                    PlayerRequest::Command(command) => {
                        if let Err(e) = model.apply(&command) {
                            warn!("Player ignored command {}: {}", command.action, e);
                        }
                    }
                    PlayerRequest::Invoke { invocation, reply } => {
                        let _ = reply.send(model.apply(&invocation));
                    }
                    PlayerRequest::Snapshot { reply } => {
                        let _ = reply.send(model.snapshot());
                    }
                }
            }
            debug!("Local player task finished");
        });

        Self { tx }
    }

    fn unavailable() -> EngineError {
        EngineError::Unavailable("local player task has stopped".to_string())
    }
}

#[async_trait]
impl PlayerEngine for LocalPlayer {
    fn send_command(&self, command: &ActionInvocation) {
        if self.tx.send(PlayerRequest::Command(command.clone())).is_err() {
            warn!("Local player is not running, dropped {}", command.action);
        }
    }

    async fn invoke(&self, invocation: &ActionInvocation) -> Result<Value, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PlayerRequest::Invoke {
                invocation: invocation.clone(),
                reply,
            })
            .map_err(|_| Self::unavailable())?;
        rx.await.map_err(|_| Self::unavailable())?
    }

    async fn snapshot(&self) -> Result<PlayerSnapshot, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PlayerRequest::Snapshot { reply })
            .map_err(|_| Self::unavailable())?;
        rx.await.map_err(|_| Self::unavailable())
    }
}

// ============================================================================
// Player model
// ============================================================================

struct PlayerModel {
    queue: Vec<String>,
    current: usize,
    playing: bool,
    /// Position (seconds) at the last play/seek
    position: f64,
    /// When playback last resumed; position advances from here
    resumed_at: Option<Instant>,
    last_play_start: Option<f64>,
    repeat_mode: i64,
    shuffle: bool,
    volume: f64,
}

impl PlayerModel {
    fn new(queue: Vec<String>) -> Self {
        Self {
            queue,
            current: 0,
            playing: false,
            position: 0.0,
            resumed_at: None,
            last_play_start: None,
            repeat_mode: REPEAT_OFF,
            shuffle: false,
            volume: 100.0,
        }
    }

    fn apply(&mut self, invocation: &ActionInvocation) -> Result<Value, EngineError> {
        match invocation.action.as_str() {
            "pause" => self.pause(),
            "resume" | "play" => self.play(),
            "toggle" => {
                if self.playing {
                    self.pause()
                } else {
                    self.play()
                }
            }
            "next" => self.skip(1),
            "previous" => self.skip(-1),
            "setRepeatMode" => {
                let mode = invocation
                    .param("mode")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| EngineError::Failed("mode must be an integer".into()))?;
                self.repeat_mode = mode;
            }
            "setShuffleMode" => {
                self.shuffle = invocation
                    .param("shuffle")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| EngineError::Failed("shuffle must be a boolean".into()))?;
            }
            "seek" => {
                let time = invocation
                    .param("time")
                    .and_then(Value::as_f64)
                    .ok_or_else(|| EngineError::Failed("time must be a number".into()))?;
                self.position = time.max(0.0);
                if self.playing {
                    self.resumed_at = Some(Instant::now());
                }
            }
            "volume" => self.set_volume(invocation.param("volume"))?,
            "playNext" => {
                let item = item_id(invocation)?;
                let at = (self.current + 1).min(self.queue.len());
                self.queue.insert(at, item);
            }
            "addToQueue" => {
                let item = item_id(invocation)?;
                self.queue.push(item);
            }
            other => return Err(EngineError::NotFound(other.to_string())),
        }
        Ok(Value::Null)
    }

    fn play(&mut self) {
        if !self.playing && !self.queue.is_empty() {
            self.playing = true;
            self.resumed_at = Some(Instant::now());
            self.last_play_start = Some(chrono::Utc::now().timestamp_millis() as f64);
        }
    }

    fn pause(&mut self) {
        if self.playing {
            self.position = self.elapsed();
            self.playing = false;
            self.resumed_at = None;
        }
    }

    fn skip(&mut self, delta: i64) {
        if self.queue.is_empty() {
            return;
        }
        let len = self.queue.len() as i64;
        let target = self.current as i64 + delta;
        let target = if self.repeat_mode == REPEAT_ALL {
            target.rem_euclid(len)
        } else {
            target.clamp(0, len - 1)
        };
        self.current = target as usize;
        self.position = 0.0;
        if self.playing {
            self.resumed_at = Some(Instant::now());
        }
    }

    /// Absolute 0-100, or a signed relative delta such as `"+5"`; result is
    /// clamped to 0-100
    fn set_volume(&mut self, value: Option<&Value>) -> Result<(), EngineError> {
        let next = match value {
            Some(Value::Number(n)) => n.as_f64(),
            // Parsed as f64 so oversized steps saturate instead of failing
            Some(Value::String(s)) => s
                .parse::<f64>()
                .ok()
                .filter(|delta| !delta.is_nan())
                .map(|delta| self.volume + delta),
            _ => None,
        }
        .ok_or_else(|| EngineError::Failed("volume must be a number or delta".into()))?;
        self.volume = next.clamp(0.0, 100.0);
        Ok(())
    }

    fn elapsed(&self) -> f64 {
        match self.resumed_at {
            Some(at) => self.position + at.elapsed().as_secs_f64(),
            None => self.position,
        }
    }

    fn snapshot(&self) -> PlayerSnapshot {
        let play_queue = Value::Array(
            self.queue
                .iter()
                .map(|id| json!({ "id": id }))
                .collect(),
        );

        let media = self.queue.get(self.current).map(|id| {
            let mut media = Fields::new();
            media.insert("track".into(), json!({ "id": id }));
            media
        });

        let play_time = self.elapsed();
        PlayerSnapshot {
            playing: self.playing,
            play_time: (play_time * 1000.0).round() / 1000.0,
            repeat_mode: self.repeat_mode,
            shuffle: self.shuffle,
            play_queue,
            volume: Some(self.volume),
            current_time: Some(play_time),
            last_play_start: self.last_play_start,
            media,
        }
    }
}

fn item_id(invocation: &ActionInvocation) -> Result<String, EngineError> {
    invocation
        .param("itemId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EngineError::Failed("itemId must be a non-empty string".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> LocalPlayer {
        LocalPlayer::spawn(vec!["a".into(), "b".into(), "c".into()])
    }

    #[tokio::test]
    async fn test_relative_volume_is_clamped() {
        let player = player();

        player.send_command(&ActionInvocation::new("volume").with_param("volume", 50));
        player.send_command(&ActionInvocation::new("volume").with_param("volume", "+10"));
        let snap = player.snapshot().await.unwrap();
        assert_eq!(snap.volume, Some(60.0));

        player.send_command(&ActionInvocation::new("volume").with_param("volume", "+90"));
        let snap = player.snapshot().await.unwrap();
        assert_eq!(snap.volume, Some(100.0));

        player.send_command(&ActionInvocation::new("volume").with_param("volume", "-150"));
        let snap = player.snapshot().await.unwrap();
        assert_eq!(snap.volume, Some(0.0));
    }

    #[tokio::test]
    async fn test_huge_relative_volume_saturates() {
        let player = player();
        player.send_command(&ActionInvocation::new("volume").with_param("volume", 10));

        player.send_command(
            &ActionInvocation::new("volume").with_param("volume", "+99999999999999999999"),
        );
        let snap = player.snapshot().await.unwrap();
        assert_eq!(snap.volume, Some(100.0));

        player.send_command(
            &ActionInvocation::new("volume").with_param("volume", "-99999999999999999999"),
        );
        let snap = player.snapshot().await.unwrap();
        assert_eq!(snap.volume, Some(0.0));
    }

    #[tokio::test]
    async fn test_toggle_and_queue() {
        let player = player();

        player.invoke(&ActionInvocation::new("toggle")).await.unwrap();
        assert!(player.snapshot().await.unwrap().playing);

        player
            .invoke(&ActionInvocation::new("playNext").with_param("itemId", "x"))
            .await
            .unwrap();
        player
            .invoke(&ActionInvocation::new("addToQueue").with_param("itemId", "z"))
            .await
            .unwrap();
        player.invoke(&ActionInvocation::new("next")).await.unwrap();

        let snap = player.snapshot().await.unwrap();
        assert_eq!(
            snap.play_queue,
            json!([{"id": "a"}, {"id": "x"}, {"id": "b"}, {"id": "c"}, {"id": "z"}])
        );
        assert_eq!(snap.media.unwrap()["track"], json!({"id": "x"}));

        player.invoke(&ActionInvocation::new("toggle")).await.unwrap();
        assert!(!player.snapshot().await.unwrap().playing);
    }

    #[tokio::test]
    async fn test_repeat_all_wraps() {
        let player = player();
        player.send_command(&ActionInvocation::new("setRepeatMode").with_param("mode", REPEAT_ALL));
        player.invoke(&ActionInvocation::new("previous")).await.unwrap();

        let snap = player.snapshot().await.unwrap();
        assert_eq!(snap.repeat_mode, REPEAT_ALL);
        assert_eq!(snap.media.unwrap()["track"], json!({"id": "c"}));
    }

    #[tokio::test]
    async fn test_unknown_action_not_found() {
        let player = player();
        let result = player.invoke(&ActionInvocation::new("doesNotExist")).await;
        assert_eq!(result, Err(EngineError::NotFound("doesNotExist".into())));
    }

    #[tokio::test]
    async fn test_seek_while_paused() {
        let player = player();
        player.send_command(&ActionInvocation::new("seek").with_param("time", 30.5));
        let snap = player.snapshot().await.unwrap();
        assert_eq!(snap.play_time, 30.5);
        assert!(!snap.playing);
    }
}
