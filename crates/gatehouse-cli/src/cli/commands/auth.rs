//! Account command handlers.

use anyhow::{Result, bail};
use gatehouse_types::{AccountUpdate, AuthUser, UserMetadata};

use super::auth_failure;
use crate::cli::app::App;

fn describe(user: &AuthUser) -> String {
    match &user.name {
        Some(name) => format!("{name} <{}>", user.email),
        None => user.email.clone(),
    }
}

pub async fn signup(app: &App, name: &str, email: &str, password: &str) -> Result<()> {
    let metadata = UserMetadata {
        name: Some(name.to_string()),
        avatar_url: None,
    };
    let response = app
        .auth
        .sign_up(email, password, Some(metadata))
        .await
        .map_err(|err| auth_failure(&err))?;
    println!("Account created. Signed in as {}", describe(&response.user));
    Ok(())
}

pub async fn login(app: &App, email: &str, password: &str) -> Result<()> {
    let response = app
        .auth
        .sign_in(email, password)
        .await
        .map_err(|err| auth_failure(&err))?;
    println!("Signed in as {}", describe(&response.user));
    Ok(())
}

pub async fn logout(app: &App) -> Result<()> {
    let was_signed_in = app.auth.state().is_authenticated();
    app.auth.sign_out().await.map_err(|err| auth_failure(&err))?;
    if was_signed_in {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

pub fn status(app: &App) {
    let state = app.auth.state();
    match (&state.user, &state.session) {
        (Some(user), Some(session)) => {
            println!("Signed in as {}", describe(user));
            println!("User id: {}", user.id);
            let verified = if user.email_verified.is_some() {
                "yes"
            } else {
                "no"
            };
            println!("Email verified: {verified}");
            println!(
                "Session expires: {}",
                session.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        _ => println!("Not signed in."),
    }
}

pub async fn reset_password(app: &App, email: &str) -> Result<()> {
    let response = app
        .auth
        .reset_password(email)
        .await
        .map_err(|err| auth_failure(&err))?;
    println!("{}", response.message);
    Ok(())
}

pub async fn change_password(app: &App, password: &str) -> Result<()> {
    if !app.auth.state().is_authenticated() {
        bail!("Not signed in. Run `gatehouse login` first.");
    }
    app.auth
        .update_password(password)
        .await
        .map_err(|err| auth_failure(&err))?;
    println!("Password updated.");
    Ok(())
}

pub async fn update_account(app: &App, update: AccountUpdate) -> Result<()> {
    if !app.auth.state().is_authenticated() {
        bail!("Not signed in. Run `gatehouse login` first.");
    }
    let user = app
        .auth
        .update_account(update)
        .await
        .map_err(|err| auth_failure(&err))?;
    println!("Account updated: {}", describe(&user));
    Ok(())
}
