mod merchant_world;
mod steps;

pub use merchant_world::MerchantWorld;
