//! Profile command handlers.

use anyhow::{Context, Result, bail};
use gatehouse_core::{ProfileState, ProfileStore};
use gatehouse_types::{Profile, ProfileChanges};

use crate::cli::app::App;

/// Waits until the store has finished loading `user_id`'s profile.
async fn loaded(store: &ProfileStore, user_id: &str) -> Result<ProfileState> {
    let mut rx = store.watch();
    let state = rx
        .wait_for(|state| state.user_id.as_deref() == Some(user_id) && !state.is_loading)
        .await
        .context("profile store stopped")?
        .clone();
    Ok(state)
}

fn signed_in_user_id(app: &App) -> Result<String> {
    match app.auth.state().user {
        Some(user) => Ok(user.id),
        None => bail!("Not signed in. Run `gatehouse login` first."),
    }
}

fn print_profile(profile: &Profile) {
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    println!("Bio: {}", field(&profile.bio));
    println!("Phone: {}", field(&profile.phone));
    println!("Avatar: {}", field(&profile.avatar_url));
    if let Some(preferences) = &profile.preferences {
        println!(
            "Preferences: {}",
            serde_json::Value::Object(preferences.clone())
        );
    }
    println!(
        "Updated: {}",
        profile.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

pub async fn show(app: &App) -> Result<()> {
    let user_id = signed_in_user_id(app)?;
    let store = app.profiles();
    let state = loaded(&store, &user_id).await?;

    if let Some(error) = state.error {
        bail!("Failed to load profile: {error}");
    }
    match state.profile {
        Some(profile) => print_profile(&profile),
        None => println!("No profile yet. Create one with `gatehouse profile update`."),
    }
    Ok(())
}

pub async fn update(
    app: &App,
    bio: Option<String>,
    phone: Option<String>,
    avatar_url: Option<String>,
) -> Result<()> {
    let changes = ProfileChanges {
        bio,
        phone,
        avatar_url,
        preferences: None,
    };
    if changes.is_empty() {
        bail!("Nothing to update: pass --bio, --phone or --avatar-url");
    }

    let user_id = signed_in_user_id(app)?;
    let store = app.profiles();
    // Knowing whether a row exists avoids a redundant create.
    loaded(&store, &user_id).await?;

    let profile = store
        .update_profile(changes)
        .await?
        .context("Not signed in. Run `gatehouse login` first.")?;
    println!("Profile updated.");
    print_profile(&profile);
    Ok(())
}
