use anyhow::{Result, bail};
use chrono::Utc;
use serde::Serialize;

use nutriflow_core::models::{
    ActivityLevel, BmiCategory, DailyTargets, Gender, ProfileInput, UserProfile,
};
use nutriflow_core::store::StateStore;

use super::helpers::print_json;

/// Profile fields that may be given on the command line.
#[derive(Debug, Default)]
pub(crate) struct ProfileArgs {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub target_weight: Option<f64>,
    pub activity: Option<ActivityLevel>,
    /// Re-derive the daily targets from the (edited) body fields.
    pub recalculate: bool,
}

impl ProfileArgs {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.avatar.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.height.is_none()
            && self.weight.is_none()
            && self.target_weight.is_none()
            && self.activity.is_none()
            && !self.recalculate
    }

    fn touches_body(&self) -> bool {
        self.age.is_some()
            || self.gender.is_some()
            || self.height.is_some()
            || self.weight.is_some()
            || self.target_weight.is_some()
            || self.activity.is_some()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView<'a> {
    #[serde(flatten)]
    profile: &'a UserProfile,
    bmi: Option<f64>,
    bmi_category: Option<BmiCategory>,
    days_on_plan: Option<i64>,
}

fn print_targets(t: &DailyTargets) {
    println!(
        "  Daily target: {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
        t.calories, t.protein, t.carbs, t.fat
    );
}

pub(crate) fn cmd_onboard(store: &mut StateStore, input: &ProfileInput, json: bool) -> Result<()> {
    let profile = store.complete_onboarding(input)?;

    if json {
        return print_json(profile);
    }
    let name = &profile.name;
    println!("Welcome, {name}!");
    print_targets(&profile.targets());
    Ok(())
}

pub(crate) fn cmd_profile_show(store: &StateStore, json: bool) -> Result<()> {
    let profile = store.user();
    let bmi = profile.bmi();
    let view = ProfileView {
        profile,
        bmi,
        bmi_category: bmi.map(BmiCategory::from_bmi),
        days_on_plan: profile.days_on_plan(Utc::now()),
    };

    if json {
        return print_json(&view);
    }

    if !profile.is_onboarded {
        println!("Not onboarded yet. Run `nutriflow onboard` to set up your profile.");
        print_targets(&profile.targets());
        return Ok(());
    }

    let name = &profile.name;
    println!("=== {name} ===\n");
    if let Some(gender) = profile.gender {
        println!("  Age {} | {gender}", profile.age);
    }
    println!(
        "  Height {:.0} cm | Weight {:.1} kg | Target {:.1} kg",
        profile.height, profile.weight, profile.target_weight
    );
    if let Some(level) = profile.activity_level {
        println!("  Activity: {level}");
    }
    if let (Some(bmi), Some(category)) = (view.bmi, view.bmi_category) {
        println!("  BMI: {bmi:.1} ({category})");
    }
    if let Some(days) = view.days_on_plan {
        println!("  Day {days} of your plan");
    }
    print_targets(&profile.targets());
    Ok(())
}

pub(crate) fn cmd_profile_set(store: &mut StateStore, args: ProfileArgs, json: bool) -> Result<()> {
    if args.is_empty() {
        bail!("Nothing to update. Provide at least one profile field");
    }

    let mut profile = store.user().clone();
    if args.touches_body() || args.recalculate {
        let Some(current) = profile.input() else {
            bail!("Profile is incomplete. Run `nutriflow onboard` first");
        };
        let input = ProfileInput {
            name: current.name,
            age: args.age.unwrap_or(current.age),
            gender: args.gender.unwrap_or(current.gender),
            height: args.height.unwrap_or(current.height),
            weight: args.weight.unwrap_or(current.weight),
            target_weight: args.target_weight.unwrap_or(current.target_weight),
            activity_level: args.activity.unwrap_or(current.activity_level),
        };
        input.validate()?;
        if args.recalculate {
            profile.apply_input(&input);
        } else {
            profile.apply_body(&input);
        }
    }
    if let Some(name) = args.name {
        profile.name = name;
    }
    if let Some(avatar) = args.avatar {
        profile.avatar = Some(avatar);
    }
    store.update_profile(profile)?;

    if json {
        return print_json(store.user());
    }
    println!("Profile updated");
    print_targets(&store.user().targets());
    Ok(())
}
