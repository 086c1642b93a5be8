//! External service integrations.

pub mod google_ads {
    pub use crate::google_ads::*;
}

pub mod meta_ads {
    pub use crate::meta_ads::*;
}

pub mod sheets {
    pub use crate::sheets::*;
}
