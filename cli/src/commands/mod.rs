mod day;
mod estimate;
mod helpers;
mod items;
mod log;
mod profile;
mod summary;

pub(crate) use day::{cmd_mood, cmd_select};
pub(crate) use estimate::cmd_estimate;
pub(crate) use items::{cmd_delete, cmd_edit};
pub(crate) use log::{
    PhotoReview, cmd_log_manual, cmd_log_photo, cmd_log_text, parse_item_quantity,
};
pub(crate) use profile::{ProfileArgs, cmd_onboard, cmd_profile_set, cmd_profile_show};
pub(crate) use summary::{cmd_history, cmd_summary};
