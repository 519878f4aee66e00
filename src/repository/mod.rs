//! Repository contracts consumed by the handlers (§4.6): pure
//! data-access interfaces, each with an in-memory implementation for the
//! default profile.

pub mod layer;
pub mod location;
pub mod processed_event;
pub mod realm;

pub use layer::{DescriptionLayer, InMemoryLayerRepository, LayerRepository, LayerType};
pub use location::{Exit, ExitAvailability, InMemoryLocationRepository, Location, LocationRepository};
pub use processed_event::{InMemoryProcessedEventRepository, ProcessedEventRecord, ProcessedEventRepository};
pub use realm::{InMemoryRealmRepository, Realm, RealmRepository, RealmScope, RealmType};

#[cfg(feature = "postgres")]
pub use processed_event::PostgresProcessedEventRepository;
