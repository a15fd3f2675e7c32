// src/services/strategies/common.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub ts:    DateTime<Utc>,
    pub price: f64,
}

impl PricePoint {
    pub fn new(ts: DateTime<Utc>, price: f64) -> Self {
        Self { ts, price }
    }

    fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Time-ordered, non-empty price history for one evaluation.
///
/// Built fresh every decision cycle and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Keeps points with a positive finite price whose timestamp is strictly
    /// after the previously kept one. `None` when nothing survives.
    pub fn from_points(points: impl IntoIterator<Item = PricePoint>) -> Option<Self> {
        let mut kept: Vec<PricePoint> = Vec::new();
        for p in points {
            if !p.is_valid() {
                continue;
            }
            if kept.last().map_or(true, |last| p.ts > last.ts) {
                kept.push(p);
            }
        }
        (!kept.is_empty()).then_some(Self { points: kept })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn latest(&self) -> &PricePoint {
        // non-empty by construction
        &self.points[self.points.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
