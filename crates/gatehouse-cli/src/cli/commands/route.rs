//! Route guard check.

use anyhow::Result;
use gatehouse_core::{GuardAction, GuardConfig, HistoryNavigator, RouteGuard};

use crate::cli::app::App;

pub fn check(app: &App, config: &GuardConfig, path: &str) -> Result<()> {
    let mut navigator = HistoryNavigator::new(path);
    let mut guard = RouteGuard::new(config.clone());

    match guard.apply(&app.auth.state(), &mut navigator)? {
        GuardAction::Render => println!("{path}: render"),
        GuardAction::Redirect(target) => println!("{path}: redirect to {target}"),
        GuardAction::Loading | GuardAction::Hold => println!("{path}: loading"),
    }
    Ok(())
}
