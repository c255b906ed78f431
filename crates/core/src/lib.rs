pub mod backend;
pub mod error;
pub mod location;
pub mod settings;
pub mod storage;

pub use error::{Result, StorageError};
pub use location::Location;
pub use settings::{Settings, StorageOptions};
pub use storage::{BucketStorage, Storage};
