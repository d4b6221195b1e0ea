//! # pmocache - Cache de segments d'octets pour PMOTube
//!
//! Cette crate fournit un cache disque pour les flux audio : chaque piste est
//! stockée sous forme de segments `(clé, offset, longueur)` écrits au fil de la
//! lecture réseau (write-through), indexés dans une base SQLite et évincés selon
//! une politique LRU bornée en octets.
//!
//! ## Architecture
//!
//! ```text
//! pmocache
//!     ├── db.rs          - Index SQLite des segments
//!     ├── span_cache.rs  - Trait SpanCache, DiskSpanCache, SpanWriter
//!     ├── gate.rs        - Garde lecture seule conditionnelle
//!     └── config_ext.rs  - Intégration pmoconfig (feature "pmoconfig")
//! ```
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use pmocache::{DiskSpanCache, SpanCache};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = DiskSpanCache::new("./cache_stream", 1 << 30)?;
//!
//!     let mut writer = cache.start_write("dQw4w9WgXcQ", 0).await?;
//!     writer.write(b"some audio bytes").await?;
//!     cache.commit(writer).await?;
//!
//!     assert!(cache.is_cached("dQw4w9WgXcQ", 0, 16).await?);
//!     let mut buf = [0u8; 16];
//!     let n = cache.read_at("dQw4w9WgXcQ", 0, &mut buf).await?;
//!     println!("read {} bytes from cache", n);
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
pub mod gate;
pub mod span_cache;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

pub use db::{SpanEntry, DB};
pub use error::{CacheError, Result};
pub use gate::{ReadOnlyGate, ReadOnlyPredicate};
pub use span_cache::{contiguous_from, CachedSpan, DiskSpanCache, SpanCache, SpanWriter};

#[cfg(feature = "pmoconfig")]
pub use config_ext::CacheConfigExt;
