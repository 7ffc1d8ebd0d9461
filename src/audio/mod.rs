//! # Módulo de Audio
//!
//! Motor de reproducción por guild.
//!
//! ## Arquitectura
//!
//! ### [`player`] - Reproductor
//! - Superficie que usan los comandos (`enqueue`, `pause`, `skip`, `stop`, ...)
//! - Un bucle de reproducción por guild, que arranca bajo demanda y se retira
//!   cuando la cola se vacía
//!
//! ### [`queue`] - Gestión de Cola
//! - Canciones ordenadas por guild, con extracción FIFO o aleatoria
//!
//! ### [`state`] - Registro de Guilds
//! - Todo el estado por guild detrás de un lock, con accesores acotados
//!
//! ### [`controller`] - Controlador de Reproducción
//! - Señales best-effort entre comandos y bucle: stop, nueva canción y halt
//!
//! ### [`idle`] - Monitor de Inactividad
//! - Sale del canal de voz si queda vacío o si pasa demasiado tiempo sin sonar nada
//!
//! El motor solo llega a Discord a través de los traits de [`voice`] y de
//! [`crate::ui::notifier`]; en los tests todo corre contra dobles.

pub mod controller;
pub mod idle;
pub mod player;
pub mod queue;
pub mod reporter;
pub mod state;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
