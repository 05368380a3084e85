//! Alert chime output for the CLI.
//!
//! The terminal bell is always available. Real audio through rodio is
//! behind the `audio` feature.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use opsdesk_core::{AlertPlayer, SyncConfig, SyncError, SyncResult};

/// Rings the terminal bell on stderr.
#[derive(Debug, Default)]
pub struct BellPlayer {
    rings: AtomicU64,
}

impl BellPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rings(&self) -> u64 {
        self.rings.load(Ordering::Relaxed)
    }
}

impl AlertPlayer for BellPlayer {
    fn unlock(&self) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn play(&self) -> BoxFuture<'_, SyncResult<()>> {
        Box::pin(async move {
            let mut stderr = std::io::stderr();
            stderr
                .write_all(b"\x07")
                .and_then(|_| stderr.flush())
                .map_err(|e| SyncError::alert_blocked(e.to_string()))?;
            self.rings.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    }
}

/// Player for this build: rodio when compiled with `audio`, else the bell.
pub fn default_player(config: &SyncConfig) -> Arc<dyn AlertPlayer> {
    #[cfg(feature = "audio")]
    {
        Arc::new(rodio_player::RodioPlayer::spawn(
            config.alert_asset.clone(),
            config.alert_volume,
        ))
    }
    #[cfg(not(feature = "audio"))]
    {
        let _ = config;
        Arc::new(BellPlayer::new())
    }
}

#[cfg(feature = "audio")]
pub mod rodio_player {
    use std::fs::File;
    use std::io::BufReader;
    use std::path::{Path, PathBuf};
    use std::sync::mpsc;

    use futures::future::BoxFuture;
    use opsdesk_core::{AlertPlayer, SyncError, SyncResult};
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
    use tokio::sync::oneshot;

    enum AudioCommand {
        Unlock(oneshot::Sender<SyncResult<()>>),
        Play(oneshot::Sender<SyncResult<()>>),
    }

    /// Plays the chime file through the default output device.
    ///
    /// The output stream is not `Send`, so it lives on a dedicated thread
    /// that serves commands until the player is dropped.
    pub struct RodioPlayer {
        commands: mpsc::Sender<AudioCommand>,
    }

    impl RodioPlayer {
        pub fn spawn(asset: PathBuf, volume: f32) -> Self {
            let (tx, rx) = mpsc::channel();
            let spawned = std::thread::Builder::new()
                .name("opsdesk-audio".to_string())
                .spawn(move || audio_thread(rx, asset, volume));
            if let Err(e) = spawned {
                tracing::warn!("Failed to start audio thread: {}", e);
            }
            Self { commands: tx }
        }

        async fn request(
            &self,
            make: fn(oneshot::Sender<SyncResult<()>>) -> AudioCommand,
        ) -> SyncResult<()> {
            let (tx, rx) = oneshot::channel();
            self.commands
                .send(make(tx))
                .map_err(|_| SyncError::alert_blocked("audio thread not running"))?;
            rx.await
                .map_err(|_| SyncError::alert_blocked("audio thread stopped"))?
        }
    }

    impl AlertPlayer for RodioPlayer {
        fn unlock(&self) -> BoxFuture<'_, SyncResult<()>> {
            Box::pin(self.request(AudioCommand::Unlock))
        }

        fn play(&self) -> BoxFuture<'_, SyncResult<()>> {
            Box::pin(self.request(AudioCommand::Play))
        }
    }

    fn start(handle: &OutputStreamHandle, asset: &Path, volume: f32) -> SyncResult<Sink> {
        let file = File::open(asset).map_err(|e| {
            SyncError::alert_blocked(format!("Failed to open {}: {}", asset.display(), e))
        })?;
        let source = Decoder::new(BufReader::new(file))
            .map_err(|e| SyncError::alert_blocked(format!("Failed to decode chime: {}", e)))?;
        let sink = Sink::try_new(handle)
            .map_err(|e| SyncError::alert_blocked(format!("Failed to create sink: {}", e)))?;
        sink.set_volume(volume);
        sink.append(source);
        Ok(sink)
    }

    fn audio_thread(commands: mpsc::Receiver<AudioCommand>, asset: PathBuf, volume: f32) {
        let output = match OutputStream::try_default() {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::warn!("Failed to initialize audio output: {}", e);
                None
            }
        };

        while let Ok(command) = commands.recv() {
            let Some((_stream, handle)) = &output else {
                let reply = match command {
                    AudioCommand::Unlock(reply) | AudioCommand::Play(reply) => reply,
                };
                let _ = reply.send(Err(SyncError::alert_blocked("no audio output device")));
                continue;
            };
            match command {
                // muted start proves the device and the asset work; stop it
                // right away so the next play starts from the beginning
                AudioCommand::Unlock(reply) => {
                    let result = start(handle, &asset, 0.0).map(|sink| sink.stop());
                    let _ = reply.send(result);
                }
                AudioCommand::Play(reply) => {
                    let result = start(handle, &asset, volume).map(Sink::detach);
                    let _ = reply.send(result);
                }
            }
        }
        tracing::debug!("audio thread exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bell_unlocks_and_rings() {
        let bell = BellPlayer::new();
        bell.unlock().await.unwrap();
        bell.play().await.unwrap();
        assert_eq!(bell.rings(), 1);
    }
}
