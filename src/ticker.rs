// 2.0: ticker record. curve state plus the derived market stats the UI reads.
// chart_data is capped; the oldest point goes first.

use crate::curve::{self, CurveError, CurveParams, CurveState};
use crate::types::{AccountId, Quote, TickerId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub time: Timestamp,
    pub price: Decimal,
    pub volume: Decimal,
    pub market_cap: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub id: TickerId,
    pub name: String,
    pub symbol: String,
    pub icon: Option<String>,
    pub creator: AccountId,
    pub price: Decimal,
    pub supply: Decimal,
    pub market_cap: Decimal,
    pub volume_24h: Decimal,
    pub price_change_24h: Decimal,
    pub trending_score: Decimal,
    pub chart_data: Vec<ChartPoint>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Ticker {
    /// Fresh ticker at its opening curve with a single `t0` chart point.
    pub fn new(
        id: TickerId,
        name: String,
        symbol: String,
        icon: Option<String>,
        creator: AccountId,
        curve: CurveState,
        now: Timestamp,
    ) -> Result<Self, CurveError> {
        let price = curve.price()?;
        Ok(Self {
            id,
            name,
            symbol,
            icon,
            creator,
            price,
            supply: curve.supply,
            market_cap: curve.market_cap,
            volume_24h: Decimal::ZERO,
            price_change_24h: Decimal::ZERO,
            trending_score: Decimal::ZERO,
            chart_data: vec![ChartPoint {
                time: now,
                price,
                volume: Decimal::ZERO,
                market_cap: curve.market_cap,
            }],
            created_at: now,
            updated_at: now,
        })
    }

    pub fn curve(&self) -> CurveState {
        CurveState {
            market_cap: self.market_cap,
            supply: self.supply,
        }
    }

    /// Chart point whose time is closest to 24h before `now`. For tickers
    /// younger than a day this is the earliest point.
    pub fn reference_point(&self, now: Timestamp) -> Option<&ChartPoint> {
        let target = curve::day_ago(now).as_millis();
        self.chart_data
            .iter()
            .min_by_key(|p| (p.time.as_millis() - target).abs())
    }

    /// Moves the ticker to `after` and refreshes volume, 24h change,
    /// trending score and the chart. Nothing is mutated on error.
    pub fn apply_trade(
        &mut self,
        after: CurveState,
        notional: Quote,
        now: Timestamp,
        params: &CurveParams,
    ) -> Result<(), CurveError> {
        let price = after.price()?;
        let volume_24h = self
            .volume_24h
            .checked_add(notional.value())
            .ok_or(CurveError::PricingCorruption("volume_24h"))?;
        let reference = self.reference_point(now).map(|p| p.price).unwrap_or(price);
        let price_change_24h = curve::price_change_pct(reference, price)?;
        let trending_score = curve::trending_score(volume_24h, price_change_24h)?;

        self.price = price;
        self.supply = after.supply;
        self.market_cap = after.market_cap;
        self.volume_24h = volume_24h;
        self.price_change_24h = price_change_24h;
        self.trending_score = trending_score;
        self.updated_at = now;
        self.push_chart_point(
            ChartPoint {
                time: now,
                price,
                volume: notional.value(),
                market_cap: after.market_cap,
            },
            params.max_chart_points,
        );
        Ok(())
    }

    fn push_chart_point(&mut self, point: ChartPoint, cap: usize) {
        self.chart_data.push(point);
        if self.chart_data.len() > cap {
            let excess = self.chart_data.len() - cap;
            self.chart_data.drain(0..excess);
        }
    }

    /// Structural checks applied whenever a ticker is read back from storage.
    pub fn validate(&self) -> Result<(), String> {
        if self.supply <= Decimal::ZERO {
            return Err(format!("supply must be positive, got {}", self.supply));
        }
        if self.market_cap <= Decimal::ZERO {
            return Err(format!("market cap must be positive, got {}", self.market_cap));
        }
        if self.price <= Decimal::ZERO {
            return Err(format!("price must be positive, got {}", self.price));
        }
        if self.symbol.trim().is_empty() {
            return Err("symbol is empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ticker_at(now: Timestamp) -> Ticker {
        Ticker::new(
            TickerId::generate(),
            "Naira Moon".to_string(),
            "NMOON".to_string(),
            None,
            AccountId(7),
            CurveState::new(dec!(100000), dec!(1_000_000_000)).unwrap(),
            now,
        )
        .unwrap()
    }

    #[test]
    fn new_ticker_has_opening_point() {
        let ticker = ticker_at(Timestamp::from_millis(1_000));
        assert_eq!(ticker.chart_data.len(), 1);
        assert_eq!(ticker.price, dec!(0.0001));
        assert!(ticker.validate().is_ok());
    }

    #[test]
    fn trade_updates_metrics_and_chart() {
        let mut ticker = ticker_at(Timestamp::from_millis(0));
        let params = CurveParams::default();
        let quote = curve::quote_buy(&ticker.curve(), dec!(10000), &params).unwrap();

        ticker
            .apply_trade(quote.after, quote.ngn_amount, Timestamp::from_millis(60_000), &params)
            .unwrap();

        assert_eq!(ticker.market_cap, dec!(109980));
        assert_eq!(ticker.volume_24h, dec!(10000));
        assert_eq!(ticker.chart_data.len(), 2);
        assert!(ticker.price_change_24h > Decimal::ZERO);
        assert!(ticker.trending_score > Decimal::ZERO);
    }

    #[test]
    fn chart_is_capped_oldest_first() {
        let mut ticker = ticker_at(Timestamp::from_millis(0));
        let params = CurveParams {
            max_chart_points: 5,
            ..CurveParams::default()
        };

        for i in 1..=10 {
            let quote = curve::quote_buy(&ticker.curve(), dec!(100), &params).unwrap();
            ticker
                .apply_trade(quote.after, quote.ngn_amount, Timestamp::from_millis(i * 1000), &params)
                .unwrap();
        }

        assert_eq!(ticker.chart_data.len(), 5);
        assert_eq!(ticker.chart_data[0].time.as_millis(), 6_000);
        assert_eq!(ticker.chart_data[4].time.as_millis(), 10_000);
    }

    #[test]
    fn reference_point_is_nearest_to_a_day_ago() {
        let mut ticker = ticker_at(Timestamp::from_millis(0));
        let day = Timestamp::DAY_MS;
        for t in [day / 2, day, day + day / 2] {
            ticker.chart_data.push(ChartPoint {
                time: Timestamp::from_millis(t),
                price: Decimal::from(t),
                volume: Decimal::ZERO,
                market_cap: dec!(1),
            });
        }

        let now = Timestamp::from_millis(2 * day + 1000);
        let reference = ticker.reference_point(now).unwrap();
        assert_eq!(reference.time.as_millis(), day);
    }

    #[test]
    fn young_ticker_measures_against_earliest_point() {
        let ticker = ticker_at(Timestamp::from_millis(5_000));
        let reference = ticker.reference_point(Timestamp::from_millis(10_000)).unwrap();
        assert_eq!(reference.time.as_millis(), 5_000);
    }

    #[test]
    fn validate_rejects_corrupt_state() {
        let mut ticker = ticker_at(Timestamp::from_millis(0));
        ticker.supply = Decimal::ZERO;
        assert!(ticker.validate().is_err());
    }
}
