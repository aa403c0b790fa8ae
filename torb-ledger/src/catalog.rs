//! Static seat catalog
//!
//! Maps each rank to a contiguous block of global seat ids and precomputes
//! the full seat array once. Seat lookup is `seats[id - 1]`.

use crate::{
    types::{Rank, Seat, SheetConfig, SheetId},
    Error, Result,
};

/// Standard house layout: 1000 seats over four ranks
pub const STANDARD_SHEETS: [(Rank, SheetConfig); 4] = [
    (Rank::S, SheetConfig { first_id: 1, count: 50, price: 5000 }),
    (Rank::A, SheetConfig { first_id: 51, count: 150, price: 3000 }),
    (Rank::B, SheetConfig { first_id: 201, count: 300, price: 1000 }),
    (Rank::C, SheetConfig { first_id: 501, count: 500, price: 0 }),
];

/// Immutable seat catalog
#[derive(Debug, Clone)]
pub struct SheetCatalog {
    /// Indexed by `Rank::index()`
    configs: [SheetConfig; 4],
    /// Ordered by global id
    seats: Vec<Seat>,
}

impl SheetCatalog {
    /// The standard 1000-seat layout
    pub fn standard() -> Self {
        // The standard table is contiguous from 1 by construction.
        match Self::new(&STANDARD_SHEETS) {
            Ok(catalog) => catalog,
            Err(e) => unreachable!("standard sheet table is invalid: {}", e),
        }
    }

    /// Build a catalog from one block per rank
    ///
    /// Every rank must appear exactly once with a non-empty block, and the
    /// blocks taken together must cover `[1, total]` with no gap or overlap.
    pub fn new(table: &[(Rank, SheetConfig)]) -> Result<Self> {
        let mut slots: [Option<SheetConfig>; 4] = [None; 4];
        for (rank, config) in table {
            if config.count <= 0 {
                return Err(Error::Config(format!("rank {} has no seats", rank)));
            }
            if slots[rank.index()].replace(*config).is_some() {
                return Err(Error::Config(format!("rank {} configured twice", rank)));
            }
        }

        let mut configs = [SheetConfig { first_id: 0, count: 0, price: 0 }; 4];
        for rank in Rank::ALL {
            configs[rank.index()] = slots[rank.index()]
                .ok_or_else(|| Error::Config(format!("rank {} missing", rank)))?;
        }

        let mut blocks: Vec<(Rank, SheetConfig)> =
            Rank::ALL.iter().map(|r| (*r, configs[r.index()])).collect();
        blocks.sort_by_key(|(_, c)| c.first_id);

        let mut next_id = 1;
        let mut seats = Vec::new();
        for (rank, config) in blocks {
            if config.first_id != next_id {
                return Err(Error::Config(format!(
                    "rank {} starts at {}, expected {}",
                    rank, config.first_id, next_id
                )));
            }
            for num in 1..=config.count {
                seats.push(Seat {
                    id: config.first_id + num - 1,
                    rank,
                    num,
                    price: config.price,
                });
            }
            next_id = config.first_id + config.count;
        }

        Ok(Self { configs, seats })
    }

    /// `(first_id, count)` of a rank
    pub fn range_for(&self, rank: Rank) -> (SheetId, i64) {
        let config = &self.configs[rank.index()];
        (config.first_id, config.count)
    }

    /// Static block of a rank
    pub fn config(&self, rank: Rank) -> &SheetConfig {
        &self.configs[rank.index()]
    }

    /// Seat by global id
    pub fn seat(&self, id: SheetId) -> Result<&Seat> {
        if id < 1 {
            return Err(Error::OutOfRange(id));
        }
        self.seats
            .get((id - 1) as usize)
            .ok_or(Error::OutOfRange(id))
    }

    /// Seat by rank and ordinal within the rank
    pub fn seat_by_num(&self, rank: Rank, num: i64) -> Result<&Seat> {
        let (first_id, count) = self.range_for(rank);
        if num < 1 || num > count {
            return Err(Error::OutOfRange(num));
        }
        self.seat(first_id + num - 1)
    }

    /// Whether the label names a configured rank
    pub fn is_valid_rank(&self, label: &str) -> bool {
        label.parse::<Rank>().is_ok()
    }

    /// Price of a rank for an event with the given base price
    pub fn rank_price(&self, rank: Rank, base_price: i64) -> i64 {
        base_price + self.configs[rank.index()].price
    }

    /// Total number of seats
    pub fn total(&self) -> i64 {
        self.seats.len() as i64
    }

    /// All seats ordered by id
    pub fn seats(&self) -> &[Seat] {
        &self.seats
    }
}

impl Default for SheetCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
