use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard};
use tracing::debug;

use crate::error::{PlaybackError, PlaybackResult, SignalKind};

/// Extremo receptor del canal de stop de un stream; lo recibe el sink de audio.
#[derive(Debug)]
pub struct StopSignal {
    rx: mpsc::Receiver<()>,
}

impl StopSignal {
    /// Se resuelve cuando llega un stop.
    ///
    /// Un sender descartado no cuenta como stop: el future queda pendiente.
    pub async fn fired(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    pub fn try_fired(&mut self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

/// Prueba de que se posee el registro actual del canal de stop.
#[derive(Debug, PartialEq, Eq)]
pub struct StreamTicket(u64);

#[derive(Debug)]
struct ActiveStream {
    id: u64,
    tx: mpsc::Sender<()>,
}

/// Lo que despertó al bucle de reproducción.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    NewTrack,
    Halt,
}

/// Centro de señales por guild entre los comandos y el bucle de reproducción.
///
/// Todo envío es un `try_send` a un buzón de capacidad uno. Quien envía nunca
/// se bloquea y las señales repetidas antes de que el bucle despierte se
/// funden en una sola. Cada señal que no llega se registra y se cuenta.
#[derive(Debug)]
pub struct PlaybackController {
    guild_id: GuildId,
    wake_tx: mpsc::Sender<()>,
    wake_rx: AsyncMutex<mpsc::Receiver<()>>,
    halt_tx: mpsc::Sender<()>,
    halt_rx: AsyncMutex<mpsc::Receiver<()>>,
    stream: Mutex<Option<ActiveStream>>,
    next_stream: AtomicU64,
    missed: AtomicU64,
}

impl PlaybackController {
    pub fn new(guild_id: GuildId) -> Self {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (halt_tx, halt_rx) = mpsc::channel(1);

        Self {
            guild_id,
            wake_tx,
            wake_rx: AsyncMutex::new(wake_rx),
            halt_tx,
            halt_rx: AsyncMutex::new(halt_rx),
            stream: Mutex::new(None),
            next_stream: AtomicU64::new(1),
            missed: AtomicU64::new(0),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Pide al stream en curso que se detenga. Devuelve si la señal llegó.
    pub fn signal_stop(&self) -> bool {
        let delivered = self
            .stream
            .lock()
            .as_ref()
            .is_some_and(|active| active.tx.try_send(()).is_ok());

        if delivered {
            debug!("⏹️ Señal de stop entregada en guild {}", self.guild_id);
        } else {
            self.log_miss(SignalKind::Stop);
        }
        delivered
    }

    /// Despierta al bucle de reproducción. Los avisos duplicados se funden en uno.
    pub fn signal_new_track(&self) -> bool {
        let delivered = self.wake_tx.try_send(()).is_ok();
        if delivered {
            debug!("🔔 Señal de nueva canción encolada en guild {}", self.guild_id);
        } else {
            self.log_miss(SignalKind::NewTrack);
        }
        delivered
    }

    /// Pide a un bucle inactivo que reinicie su estado de reproducción.
    pub fn signal_halt(&self) -> bool {
        let delivered = self.halt_tx.try_send(()).is_ok();
        if !delivered {
            self.log_miss(SignalKind::Halt);
        }
        delivered
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.lock().is_some()
    }

    /// Instala un canal de stop nuevo para un stream.
    ///
    /// Se niega mientras otro stream conserve su registro.
    pub fn register_stream(&self) -> PlaybackResult<(StreamTicket, StopSignal)> {
        let mut slot = self.stream.lock();
        if slot.is_some() {
            return Err(PlaybackError::StateRace(self.guild_id));
        }

        let id = self.next_stream.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(1);
        *slot = Some(ActiveStream { id, tx });
        Ok((StreamTicket(id), StopSignal { rx }))
    }

    /// Elimina el registro, solo si `ticket` todavía lo posee.
    pub fn clear_stream(&self, ticket: StreamTicket) -> bool {
        let mut slot = self.stream.lock();
        match slot.as_ref() {
            Some(active) if active.id == ticket.0 => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Quita el registro que haya quedado. Solo es válido si nada se está reproduciendo.
    pub(crate) fn clear_stale_stream(&self) -> bool {
        self.stream.lock().take().is_some()
    }

    /// Acceso exclusivo a los buzones del bucle.
    ///
    /// Un bucle que arranca mientras el anterior aún se retira espera aquí
    /// hasta que se suelte el listener viejo.
    pub(crate) async fn listen(&self) -> SignalListener<'_> {
        let wake = self.wake_rx.lock().await;
        let halt = self.halt_rx.lock().await;
        SignalListener { wake, halt }
    }

    pub(crate) fn try_listen(&self) -> Option<SignalListener<'_>> {
        let wake = self.wake_rx.try_lock().ok()?;
        let halt = self.halt_rx.try_lock().ok()?;
        Some(SignalListener { wake, halt })
    }

    /// Señales descartadas desde que se creó el controller.
    pub fn missed_signals(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    fn log_miss(&self, kind: SignalKind) {
        self.missed.fetch_add(1, Ordering::Relaxed);
        let miss = PlaybackError::SignalDeliveryMiss {
            guild_id: self.guild_id,
            kind,
        };
        debug!("📭 {}", miss);
    }
}

/// Lado receptor de los buzones del controller, en manos de un único bucle.
pub(crate) struct SignalListener<'a> {
    wake: MutexGuard<'a, mpsc::Receiver<()>>,
    halt: MutexGuard<'a, mpsc::Receiver<()>>,
}

impl SignalListener<'_> {
    pub async fn next(&mut self) -> Signal {
        // el controller mantiene vivos ambos senders, recv nunca devuelve None
        tokio::select! {
            biased;
            Some(()) = self.halt.recv() => Signal::Halt,
            Some(()) = self.wake.recv() => Signal::NewTrack,
            else => std::future::pending::<Signal>().await,
        }
    }
}
