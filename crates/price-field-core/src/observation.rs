use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

/// One order threshold anchored at a map location.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub x: f64,
    pub z: f64,
    pub price: u64,
    pub side: Side,
}

impl Observation {
    pub fn buy(x: f64, z: f64, price: u64) -> Self {
        Self {
            x,
            z,
            price,
            side: Side::Buy,
        }
    }

    pub fn sell(x: f64, z: f64, price: u64) -> Self {
        Self {
            x,
            z,
            price,
            side: Side::Sell,
        }
    }
}
