//! System-prompt rendering.
//!
//! Prompt files are `minijinja` templates.  The only variable provided is
//! `price_sheet`, the text of the clinic's price list (empty when none is
//! configured).

use minijinja::{context, Environment};

pub fn render_system_prompt(
    template: &str,
    price_sheet: Option<&str>,
) -> Result<String, minijinja::Error> {
    let env = Environment::new();
    env.render_str(
        template,
        context! { price_sheet => price_sheet.unwrap_or_default() },
    )
}
