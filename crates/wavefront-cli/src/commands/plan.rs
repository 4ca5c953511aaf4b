use super::{Format, PlanArgs};
use crate::render;

pub fn plan(args: PlanArgs) -> anyhow::Result<()> {
    let plan = args.shape.resolve()?;
    if args.emit_toml {
        print!("{}", plan.to_toml_string()?);
        return Ok(());
    }

    let tree = wavefront_engine::plan(&plan)?.to_table()?.hierarchy();
    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&tree)?),
        Format::Text => print!("{}", render::tree(&tree)),
    }
    Ok(())
}
