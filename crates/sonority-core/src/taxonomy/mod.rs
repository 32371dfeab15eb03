pub mod genre;
pub mod shared;

pub use genre::GenreTaxonomy;
pub use shared::SharedTaxonomy;
