//! Price-guide payload
//!
//! Stored on disk and served by the transfer collaborator as tab separated
//! text, one line per time window and condition:
//!
//! ```text
//! # time  cond  qty  lots  lowest  average  w-average  highest
//! P       N     120  14    0.05    0.11     0.09       0.40
//! C       U     3020 211   0.01    0.07     0.06       0.90
//! ```

use super::{AnyPayload, ArtifactKind, ArtifactPayload};
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Time {
    /// Sales of the last six months
    PastSix,
    /// Currently for sale
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Condition {
    New,
    Used,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Price {
    Lowest,
    Average,
    WAverage,
    Highest,
}

impl Time {
    pub const ALL: [Time; 2] = [Time::PastSix, Time::Current];

    fn code(self) -> char {
        match self {
            Time::PastSix => 'P',
            Time::Current => 'C',
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        Time::ALL.into_iter().find(|t| code.len() == 1 && code.starts_with(t.code()))
    }
}

impl Condition {
    pub const ALL: [Condition; 2] = [Condition::New, Condition::Used];

    fn code(self) -> char {
        match self {
            Condition::New => 'N',
            Condition::Used => 'U',
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        Condition::ALL.into_iter().find(|c| code.len() == 1 && code.starts_with(c.code()))
    }
}

impl Price {
    pub const ALL: [Price; 4] = [Price::Lowest, Price::Average, Price::WAverage, Price::Highest];
}

/// One line of the text form, columns in order
#[derive(Debug, Deserialize)]
struct Row {
    time: String,
    condition: String,
    quantity: u32,
    lots: u32,
    lowest: f64,
    average: f64,
    waverage: f64,
    highest: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceGuideData {
    quantities: [[u32; 2]; 2],
    lots: [[u32; 2]; 2],
    prices: [[[f64; 4]; 2]; 2],
}

impl PriceGuideData {
    pub fn quantity(&self, time: Time, condition: Condition) -> u32 {
        self.quantities[time as usize][condition as usize]
    }

    pub fn lots(&self, time: Time, condition: Condition) -> u32 {
        self.lots[time as usize][condition as usize]
    }

    pub fn price(&self, time: Time, condition: Condition, price: Price) -> f64 {
        self.prices[time as usize][condition as usize][price as usize]
    }

    pub fn set(
        &mut self,
        time: Time,
        condition: Condition,
        quantity: u32,
        lots: u32,
        prices: [f64; 4],
    ) {
        let (t, c) = (time as usize, condition as usize);
        self.quantities[t][c] = quantity;
        self.lots[t][c] = lots;
        self.prices[t][c] = prices;
    }

    /// Render in the on-disk text format
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for time in Time::ALL {
            for condition in Condition::ALL {
                let _ = write!(
                    out,
                    "{}\t{}\t{}\t{}",
                    time.code(),
                    condition.code(),
                    self.quantity(time, condition),
                    self.lots(time, condition)
                );
                for price in Price::ALL {
                    let _ = write!(out, "\t{}", self.price(time, condition, price));
                }
                out.push('\n');
            }
        }
        out
    }
}

impl ArtifactPayload for PriceGuideData {
    const KIND: ArtifactKind = ArtifactKind::PriceGuide;

    fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let mut pg = PriceGuideData::default();
        let mut lines = 0;
        let mut record = csv::StringRecord::new();

        loop {
            match reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    return Err(EngineError::MalformedPayload(format!("price guide: {}", e)));
                }
            }
            let line = record.position().map_or(0, |pos| pos.line());
            let bad = |what: &str| {
                EngineError::MalformedPayload(format!("price guide line {}: {}", line, what))
            };

            if record.len() != 8 {
                return Err(bad("expected 8 fields"));
            }
            let row: Row = record.deserialize(None).map_err(|e| bad(&e.to_string()))?;

            let time = Time::from_code(&row.time).ok_or_else(|| bad("unknown time window"))?;
            let condition =
                Condition::from_code(&row.condition).ok_or_else(|| bad("unknown condition"))?;
            let prices = [row.lowest, row.average, row.waverage, row.highest];
            if prices.iter().any(|p| !p.is_finite() || *p < 0.0) {
                return Err(bad("invalid price"));
            }

            pg.set(time, condition, row.quantity, row.lots, prices);
            lines += 1;
        }

        if lines == 0 {
            return Err(EngineError::MalformedPayload(
                "price guide has no data".to_string(),
            ));
        }
        Ok(pg)
    }

    fn cost(&self) -> usize {
        1
    }

    fn from_any(any: AnyPayload) -> Option<Self> {
        match any {
            AnyPayload::PriceGuide(pg) => Some(pg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# sample\n\
        P\tN\t120\t14\t0.05\t0.11\t0.09\t0.40\n\
        \n\
        C\tU\t3020\t211\t0.01\t0.07\t0.06\t0.90\n";

    #[test]
    fn test_parse_sample() {
        let pg = PriceGuideData::parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(pg.quantity(Time::PastSix, Condition::New), 120);
        assert_eq!(pg.lots(Time::Current, Condition::Used), 211);
        assert_eq!(pg.price(Time::Current, Condition::Used, Price::Highest), 0.90);
        assert_eq!(pg.price(Time::PastSix, Condition::New, Price::WAverage), 0.09);
        // Missing rows stay zero
        assert_eq!(pg.quantity(Time::Current, Condition::New), 0);
    }

    #[test]
    fn test_text_form_parses_back() {
        let mut pg = PriceGuideData::default();
        pg.set(Time::Current, Condition::New, 7, 2, [1.0, 1.5, 1.25, 2.0]);
        let again = PriceGuideData::parse(pg.to_text().as_bytes()).unwrap();
        assert_eq!(again, pg);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(PriceGuideData::parse(b"").is_err());
        assert!(PriceGuideData::parse(b"# only a comment\n").is_err());
        assert!(PriceGuideData::parse(b"X\tN\t1\t1\t0\t0\t0\t0").is_err());
        assert!(PriceGuideData::parse(b"P\tN\t1\t1\t0\t0\t0").is_err());
        assert!(PriceGuideData::parse(b"P\tN\t1\t1\t0\t-1\t0\t0").is_err());
        assert!(PriceGuideData::parse(&[0xff, 0xfe]).is_err());
        assert!(PriceGuideData::parse(b"P\tN\tmany\t1\t0\t0\t0\t0").is_err());
        assert!(PriceGuideData::parse(b"P\tN\t1\t1\t0\tNaN\t0\t0").is_err());
    }

    #[test]
    fn test_error_names_the_line() {
        let text = "P\tN\t1\t1\t0\t0\t0\t0\nC\tX\t1\t1\t0\t0\t0\t0\n";
        let err = PriceGuideData::parse(text.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
        assert!(err.to_string().contains("unknown condition"), "{}", err);
    }

    #[test]
    fn test_padded_columns_are_trimmed() {
        let pg = PriceGuideData::parse(b"C \t U \t 5\t1\t0.1\t0.2\t0.2\t0.3 \n").unwrap();
        assert_eq!(pg.quantity(Time::Current, Condition::Used), 5);
        assert_eq!(pg.price(Time::Current, Condition::Used, Price::Highest), 0.3);
    }
}
