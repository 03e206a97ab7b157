pub mod archive;
pub mod config_loader;
pub mod launchpad;
pub mod silo_allocator;
pub mod silo_store;
pub mod stack_graph;
pub mod tracker;
pub mod upload_monitor;
pub mod uploads;
pub mod watch;

pub use archive::ArchiveStatusClient;
pub use launchpad::LaunchpadClient;
pub use silo_allocator::SiloAllocator;
pub use silo_store::SiloConfigStore;
pub use stack_graph::{StackDependencyGraph, StatusLayout};
pub use tracker::{IgnoreMarkers, PackageStatusTracker};
pub use upload_monitor::{UploadSetMonitor, UploadSets};
pub use watch::{watch_uploads, WatchOptions, WatchOutcome};
