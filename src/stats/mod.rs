mod chi2;
mod elo;
mod gauss;
mod llr;
mod spsa;
mod sprt;

pub use chi2::*;
pub use elo::*;
pub use gauss::*;
pub use llr::*;
pub use spsa::*;
pub use sprt::*;
