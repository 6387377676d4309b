//! Data access port trait.

use crate::domain::auxiliary::{DatasetId, RawRecord};
use crate::domain::error::SamallocError;
use crate::domain::ohlcv::OhlcvBar;

pub trait DataPort {
    /// Every bar stored for `code`, oldest first.
    fn fetch_bars(&self, code: &str) -> Result<Vec<OhlcvBar>, SamallocError>;

    /// Raw records for one auxiliary dataset, oldest first.
    fn fetch_auxiliary(&self, dataset: DatasetId) -> Result<Vec<RawRecord>, SamallocError>;
}
