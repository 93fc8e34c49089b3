pub mod fees;
pub mod price_oracle;
pub mod price_refresher;
pub mod reporting;
pub mod reward_engine;

pub use fees::PurchaseCosting;
pub use price_oracle::{PriceOracle, SimulatedPriceOracle};
pub use price_refresher::{PriceRefresher, RefreshSummary};
pub use reporting::{
    DailyValuation, HoldingValuation, PortfolioValuation, ReportingService, SymbolQuantity,
    UserStats,
};
pub use reward_engine::{validate_request, RewardEngine, ValidatedReward};
