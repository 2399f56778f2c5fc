mod binding;
mod link;
mod login_miss;
mod manager;
mod org_email;
mod privacy;
mod signing;
mod verification;

pub use binding::*;
pub use link::*;
pub use login_miss::*;
pub use manager::*;
pub use org_email::*;
pub use privacy::*;
pub use signing::*;
pub use verification::*;
