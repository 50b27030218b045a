// Trade feed clients
pub mod poller;

pub use poller::RestTradePoller;
