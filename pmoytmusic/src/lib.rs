//! # pmoytmusic - Lecture de pistes YouTube Music pour PMOTube
//!
//! Cette crate fournit le pipeline de lecture d'un service de streaming de
//! type YouTube Music : résolution d'une clé de piste en URL éphémère, lecture
//! par plages d'octets avec cache disque, reprise après faute, et extension
//! automatique de la file par une radio.
//!
//! ## Architecture
//!
//! ```text
//! pmoytmusic/
//! ├── src/
//! │   ├── lib.rs            # Module principal (ce fichier)
//! │   ├── models.rs         # Structures de données (Track, StreamDescriptor, ...)
//! │   ├── error.rs          # Taxonomie des erreurs et fautes de lecture
//! │   ├── remote.rs         # Traits des services distants
//! │   ├── api/              # Client InnerTube (/player, /next)
//! │   ├── cipher.rs         # Locators signatureCipher
//! │   ├── format_store.rs   # Métadonnées de format (SQLite)
//! │   ├── ring.rs           # Mémoire des deux dernières résolutions
//! │   ├── resolver.rs       # Résolveur de flux
//! │   ├── opener.rs         # Ouverture HTTP par plage d'octets
//! │   ├── datasource.rs     # Source en couches cache / réseau
//! │   ├── retry.rs          # Contrôleur de reprise
//! │   ├── radio.rs          # Moteur de continuation radio
//! │   ├── queue.rs          # File de lecture
//! │   ├── feeder.rs         # Alimentation de la file par la radio
//! │   ├── session.rs        # Pilote de lecture
//! │   └── config_ext.rs     # Intégration pmoconfig
//! ```
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use pmoconfig::get_config;
//! use pmoytmusic::{
//!     MemoryQueue, PlaybackSession, RadioContinuation, RadioFeeder, RadioSeed,
//!     StreamConfigExt, Track,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = get_config();
//!     let client = Arc::new(config.create_innertube_client()?);
//!     let source = config.create_data_source(client.clone())?;
//!
//!     let radio = RadioContinuation::new(client, RadioSeed::from_video("dQw4w9WgXcQ"));
//!     let feeder = RadioFeeder::new(radio, config.get_radio_threshold()?);
//!     let queue = MemoryQueue::new(vec![Track::new("dQw4w9WgXcQ", "")]);
//!
//!     let mut session = PlaybackSession::new(source, queue, config.create_retry_controller()?)
//!         .with_radio(feeder)
//!         .with_max_tracks(5);
//!     let mut sink = tokio::io::sink();
//!     let report = session.play(&mut sink).await?;
//!     println!("{} tracks played", report.played());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cipher;
pub mod config_ext;
pub mod datasource;
pub mod error;
pub mod feeder;
pub mod format_store;
pub mod models;
pub mod opener;
pub mod queue;
pub mod radio;
pub mod remote;
pub mod resolver;
pub mod retry;
pub mod ring;
pub mod session;

pub use api::{InnerTubeClient, InnerTubeSettings};
pub use cipher::{CipherParts, SignatureDecipher, UnsignedOnly};
pub use config_ext::StreamConfigExt;
pub use datasource::{DataSession, LayeredDataSource, DEFAULT_CHUNK_SIZE};
pub use error::{ApiError, NetworkError, PlaybackFault, ResolutionError};
pub use feeder::{RadioFeeder, DEFAULT_RADIO_THRESHOLD};
pub use format_store::{FormatStore, SqliteFormatStore};
pub use models::{
    ContinuationPage, FormatRecord, NextPage, PlayabilityStatus, PlayableUrl, PlayerResponse,
    RadioSeed, StreamDescriptor, StreamLocator, Track,
};
pub use opener::{ByteRangeOpener, HttpRangeOpener, RangeStream};
pub use queue::{LiveQueue, MemoryQueue};
pub use radio::{CursorState, RadioContinuation};
pub use remote::{ContinuationClient, ResolutionClient};
pub use resolver::{ResolverSettings, StreamResolver};
pub use retry::{RetryController, RetryState};
pub use ring::RecentResolutions;
pub use session::{CachePolicy, PlaybackReport, PlaybackSession, TrackOutcome};
