pub mod archive;
pub mod package;
pub mod settings;
pub mod silo;
pub mod stack;

pub use archive::{
    ArchiveArchitectures, BinaryPublication, BuildRecord, BuildState, PublicationStatus,
    SeriesArchitecture, SourcePublication,
};
pub use package::{describe_packages, Arch, ArchBuildState, Package, PackageKey};
pub use settings::Settings;
pub use silo::{GlobalConfig, SiloConfig, SiloStatus};
pub use stack::{Stack, StackId, StackStatus};
