// commands/whoami.rs

use color_eyre::eyre::Result;

use super::Context;

pub async fn run(ctx: &Context) -> Result<()> {
    let me = ctx.verify_token().await?;
    println!("Authenticated as {}", me.label());
    if let Some(org_id) = &me.org_id {
        println!("Organization: {org_id}");
    }
    Ok(())
}
