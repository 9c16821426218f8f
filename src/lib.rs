pub mod engine;
pub mod error;
pub mod estimation;
pub mod model;
pub mod report;
pub mod site;
pub mod tables;

pub use engine::{ExecutionStep, GrowthEngine, PolygonProcessingState};
pub use error::{GrowthError, Resolved};
pub use model::{Bank, BecZone, PolygonDescriptor, Region, SpeciesInput, UtilizationClass, UtilizationVector};
pub use site::{SiteCurveError, SiteCurveEvaluator};
pub use tables::{ControlData, ControlVariables, GrowTarget};
