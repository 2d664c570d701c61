mod helpers;
mod instances;
mod mocks;
mod orders;
mod payments;
mod products;
