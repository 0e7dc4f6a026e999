//! Data models for Galaxy Digital entities.
//!
//! - `Volunteer`: a user with contact details, address and hour entries
//! - `HourEntry`: hours logged against an opportunity on a date
//! - `Opportunity`, `OpportunityParticipation`: needs and who worked them
//! - Raw record shapes (`ApiUser`, `ApiHour`, `ApiNeed`) as the API returns them

pub mod hours;
pub mod opportunity;
pub mod record;
pub mod volunteer;

pub use hours::HourEntry;
pub use opportunity::{Opportunity, OpportunityParticipation};
pub use record::{id_string, ApiHour, ApiNeed, ApiUser, RecordError};
pub use volunteer::{Volunteer, DETAIL_FIELDS, LONG_TERM_MONTHS};
