pub mod config;
pub mod domain;
pub mod errors;
pub mod mutex;
pub mod shorturl;
pub mod signing;
pub mod staging;
pub mod store;
pub mod time;
pub mod translate;

pub use domain::lock::LockRecord;
pub use domain::object::{ObjectKey, StagedObject, StagedObjectGrant};
pub use domain::short_url::{ShortLink, ShortUrlId, ShortUrlRecord};
pub use errors::{ApplicationError, InterfaceError};
pub use mutex::{Acquisition, MutexCoordinator};
pub use shorturl::{IdGenerator, RandomIdGenerator, Resolution, ShortUrlError, ShortUrlService};
pub use staging::{ObjectStaging, RetrievalError, StagingError, UrlSigner, OBJECT_RETENTION};
pub use store::{
    ExpiringRecord, ExpiringStore, InMemoryExpiringStore, InMemoryObjectStore, ObjectStore,
    PutOutcome, StoreError,
};
pub use time::{Clock, ManualClock, SystemClock};
pub use translate::{LanguagePair, TranslateError, Translator, UnconfiguredTranslator};
