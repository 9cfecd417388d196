//! Iterative lookup and routing table refresh over a pluggable [Transport].

mod config;
mod query;
mod refresh;
mod seeker;
mod updater;

use std::time::Duration;

use bytes::Bytes;
use rand::RngCore;

pub use config::Config;
pub use query::{drive, Query, Transport};
pub use refresh::RefreshHandle;
pub use seeker::{search, Accept, Seeker};
pub use updater::Updater;

pub(crate) use refresh::spawn;

/// Number of ids returned in a [crate::SeekResponse].
pub const DEFAULT_RETURN_NODES: usize = 5;
/// Length of the random request ids in bytes.
pub const DEFAULT_REQUEST_ID_LEN: usize = 10;
/// How many of the closest candidates a [Seeker] looks through for one it didn't query yet.
pub const DEFAULT_LOOKAHEAD: usize = 20;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15 * 60);

fn request_id(len: usize) -> Bytes {
    let mut bytes = vec![0; len];
    rand::thread_rng().fill_bytes(&mut bytes);

    bytes.into()
}
