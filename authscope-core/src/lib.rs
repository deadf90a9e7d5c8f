pub mod explore;
pub mod extract;
pub mod model;
pub mod narrate;

pub use explore::AuthExplorer;
pub use extract::extract_components;
pub use model::{
    AnalysisMethod, ComponentKind, DetectedComponent, DetectionMethod, DetectionOutcome,
};
pub use narrate::{NarrationError, Narrator, OllamaNarrator};
