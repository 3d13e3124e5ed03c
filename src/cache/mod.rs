//! Build caches
//!
//! A build cache saves one directory of an application's build output
//! (e.g. `node_modules`) as an archive keyed by the content of the files it
//! depends on, and restores it before the next build of the same app.
//!
//! # Cache States
//!
//! | State | Restore | Description |
//! |-------|---------|-------------|
//! | Exact | yes | Archive exists for the current key |
//! | Stale | if `allow_stale` | Only archives for other keys exist; newest is used |
//! | Miss | no | No archive in the cache's subdirectory |

mod config;
mod key;
mod store;

pub use config::{BuildCache, BuildCacheCollection, SHARED_SCOPE};
pub use store::{BuildCacheStore, CachedArchive};
