mod feature_variation;
mod gallery;
mod idea;
mod mutation;
mod personality;
mod refinement;
mod session;
mod swipe;
mod synthesis;
mod visual_asset;

pub use feature_variation::*;
pub use gallery::*;
pub use idea::*;
pub use mutation::*;
pub use personality::*;
pub use refinement::*;
pub use session::*;
pub use swipe::*;
pub use synthesis::*;
pub use visual_asset::*;
