pub mod generation;

pub use generation::{
    AcceptedPayload, AcceptedResult, GenerationResult, Provenance, ResumeRevision, SiteBundle,
    Stage, ValidationStatus,
};
