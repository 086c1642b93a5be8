// Domain-layer modules and shared errors/models
pub mod classifier {
    pub use crate::classifier::*;
}

pub mod aggregator {
    pub use crate::aggregator::*;
}

pub mod orchestrator {
    pub use crate::orchestrator::*;
}

pub mod rules {
    pub use crate::rules::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod errors {
    pub use crate::errors::*;
}
