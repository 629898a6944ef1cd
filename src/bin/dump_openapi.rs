use std::fs;

fn main() -> anyhow::Result<()> {
    // Generate the OpenAPI document without starting the server; handy for
    // diffing the API surface in CI.
    let doc = granular::docs::build_openapi(8000)?;
    let s = serde_json::to_string_pretty(&doc)?;
    let path = "/tmp/granular-openapi.json";
    fs::write(path, s)?;
    println!("wrote {}", path);
    Ok(())
}
