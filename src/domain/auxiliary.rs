//! Auxiliary datasets supplied alongside prices.
//!
//! The host hands over untyped records keyed by [`DatasetId`]. Each dataset
//! kind has a fixed schema; records missing a required field are skipped with
//! a warning and the rest of the dataset is still used.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatasetId {
    /// Per-instrument fundamental ratios; `ticker`, `price_to_book`.
    Ratios,
    /// Five-year breakeven inflation rate; `value`.
    BreakevenInflation,
    /// Government contract awards; `ticker`, optional `amount`.
    GovernmentContracts,
    /// Lobbying spend; `ticker`, `amount`.
    LobbyingSpend,
}

impl DatasetId {
    pub const ALL: [DatasetId; 4] = [
        DatasetId::Ratios,
        DatasetId::BreakevenInflation,
        DatasetId::GovernmentContracts,
        DatasetId::LobbyingSpend,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DatasetId::Ratios => "ratios",
            DatasetId::BreakevenInflation => "breakeven_inflation",
            DatasetId::GovernmentContracts => "government_contracts",
            DatasetId::LobbyingSpend => "lobbying_spend",
        }
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        DatasetId::ALL
            .into_iter()
            .find(|d| d.name() == wanted)
            .ok_or_else(|| format!("unknown dataset '{}'", s.trim()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            FieldValue::Number(v) => *v,
            FieldValue::Text(s) => s.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) if !s.trim().is_empty() => Some(s.trim()),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Number(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

pub type RawRecord = BTreeMap<String, FieldValue>;

/// Every auxiliary series handed over for one invocation, oldest record first.
#[derive(Debug, Clone, Default)]
pub struct AuxiliaryData {
    series: BTreeMap<DatasetId, Vec<RawRecord>>,
}

impl AuxiliaryData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dataset: DatasetId, records: Vec<RawRecord>) -> Self {
        self.insert(dataset, records);
        self
    }

    pub fn insert(&mut self, dataset: DatasetId, records: Vec<RawRecord>) {
        self.series.insert(dataset, records);
    }

    pub fn records(&self, dataset: DatasetId) -> &[RawRecord] {
        self.series.get(&dataset).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuxRecord {
    PriceToBook { code: String, value: f64 },
    Breakeven { value: f64 },
    ContractAward { code: String, amount: Option<f64> },
    Lobbying { code: String, amount: f64 },
}

fn text_field<'a>(raw: &'a RawRecord, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|n| raw.get(*n)).and_then(FieldValue::as_text)
}

fn number_field(raw: &RawRecord, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|n| raw.get(*n)).and_then(FieldValue::as_f64)
}

/// `None` when a field the dataset's schema requires is missing or unusable.
pub fn parse_record(dataset: DatasetId, raw: &RawRecord) -> Option<AuxRecord> {
    match dataset {
        DatasetId::Ratios => Some(AuxRecord::PriceToBook {
            code: text_field(raw, &["ticker"])?.to_uppercase(),
            value: number_field(raw, &["price_to_book", "priceToBook"])?,
        }),
        DatasetId::BreakevenInflation => Some(AuxRecord::Breakeven {
            value: number_field(raw, &["value"])?,
        }),
        DatasetId::GovernmentContracts => Some(AuxRecord::ContractAward {
            code: text_field(raw, &["ticker"])?.to_uppercase(),
            amount: number_field(raw, &["amount"]),
        }),
        DatasetId::LobbyingSpend => {
            let amount = number_field(raw, &["amount"]).filter(|a| *a >= 0.0)?;
            Some(AuxRecord::Lobbying {
                code: text_field(raw, &["ticker"])?.to_uppercase(),
                amount,
            })
        }
    }
}

pub fn parse_dataset(dataset: DatasetId, raw: &[RawRecord]) -> Vec<AuxRecord> {
    raw.iter()
        .enumerate()
        .filter_map(|(i, record)| {
            let parsed = parse_record(dataset, record);
            if parsed.is_none() {
                log::warn!("skipping malformed {} record #{}", dataset, i);
            }
            parsed
        })
        .collect()
}

/// Typed digest of the datasets a strategy declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryView {
    /// Latest price-to-book per instrument.
    pub price_to_book: BTreeMap<String, f64>,
    /// Latest breakeven inflation reading.
    pub breakeven: Option<f64>,
    pub contract_awards: BTreeSet<String>,
    /// Latest lobbying spend per instrument.
    pub lobbying: BTreeMap<String, f64>,
}

impl AuxiliaryView {
    pub fn build(data: &AuxiliaryData, datasets: &[DatasetId]) -> Self {
        let mut view = AuxiliaryView::default();
        for &dataset in datasets {
            for record in parse_dataset(dataset, data.records(dataset)) {
                match record {
                    AuxRecord::PriceToBook { code, value } => {
                        view.price_to_book.insert(code, value);
                    }
                    AuxRecord::Breakeven { value } => view.breakeven = Some(value),
                    AuxRecord::ContractAward { code, .. } => {
                        view.contract_awards.insert(code);
                    }
                    AuxRecord::Lobbying { code, amount } => {
                        view.lobbying.insert(code, amount);
                    }
                }
            }
        }
        view
    }

    /// Fraction of all lobbying spend attributable to `code`.
    pub fn lobbying_share(&self, code: &str) -> f64 {
        let total: f64 = self.lobbying.values().sum();
        if total <= 0.0 {
            return 0.0;
        }
        self.lobbying.get(code).copied().unwrap_or(0.0) / total
    }

    /// Upper median of the known price-to-book ratios, skipping `excluded`.
    pub fn price_to_book_median(&self, excluded: &[String]) -> Option<f64> {
        let mut values: Vec<f64> = self
            .price_to_book
            .iter()
            .filter(|(code, _)| !excluded.contains(code))
            .map(|(_, v)| *v)
            .collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);
        Some(values[values.len() / 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, FieldValue)]) -> RawRecord {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn dataset_names_round_trip() {
        for dataset in DatasetId::ALL {
            assert_eq!(dataset.name().parse::<DatasetId>(), Ok(dataset));
        }
        assert!("weather".parse::<DatasetId>().is_err());
    }

    #[test]
    fn field_value_numbers_from_text() {
        assert_eq!(FieldValue::from("2.5").as_f64(), Some(2.5));
        assert_eq!(FieldValue::from("n/a").as_f64(), None);
        assert_eq!(FieldValue::from(f64::NAN).as_f64(), None);
        assert_eq!(FieldValue::from(3.0).as_text(), None);
    }

    #[test]
    fn ratios_accept_camel_case_field() {
        let raw = record(&[
            ("ticker", "fslr".into()),
            ("priceToBook", 3.1.into()),
        ]);
        assert_eq!(
            parse_record(DatasetId::Ratios, &raw),
            Some(AuxRecord::PriceToBook {
                code: "FSLR".into(),
                value: 3.1
            })
        );
    }

    #[test]
    fn malformed_records_are_skipped() {
        let raw = vec![
            record(&[("ticker", "LMT".into()), ("amount", 100.0.into())]),
            record(&[("amount", 50.0.into())]),
            record(&[("ticker", "RTX".into()), ("amount", "lots".into())]),
            record(&[("ticker", "BA".into()), ("amount", 300.0.into())]),
        ];
        let parsed = parse_dataset(DatasetId::LobbyingSpend, &raw);
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn view_collects_declared_datasets_only() {
        let data = AuxiliaryData::new()
            .with(
                DatasetId::BreakevenInflation,
                vec![
                    record(&[("value", 1.9.into())]),
                    record(&[("value", 2.4.into())]),
                ],
            )
            .with(
                DatasetId::LobbyingSpend,
                vec![
                    record(&[("ticker", "LMT".into()), ("amount", 100.0.into())]),
                    record(&[("ticker", "BA".into()), ("amount", 200.0.into())]),
                    record(&[("ticker", "LMT".into()), ("amount", 300.0.into())]),
                ],
            );

        let view = AuxiliaryView::build(&data, &[DatasetId::BreakevenInflation]);
        assert_eq!(view.breakeven, Some(2.4));
        assert!(view.lobbying.is_empty());

        let view = AuxiliaryView::build(&data, &[DatasetId::LobbyingSpend]);
        assert_eq!(view.lobbying["LMT"], 300.0);
        assert_eq!(view.lobbying_share("LMT"), 0.6);
        assert_eq!(view.lobbying_share("XYZ"), 0.0);
    }

    #[test]
    fn median_excludes_listed_codes() {
        let mut view = AuxiliaryView::default();
        for (code, pb) in [("ICLN", 0.1), ("NEE", 2.0), ("FSLR", 3.0), ("PLUG", 1.0)] {
            view.price_to_book.insert(code.into(), pb);
        }
        assert_eq!(view.price_to_book_median(&["ICLN".to_string()]), Some(2.0));
        assert_eq!(AuxiliaryView::default().price_to_book_median(&[]), None);
    }
}
