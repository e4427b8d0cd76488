use crate::domain::models::JsonOut;
use serde::Serialize;

pub fn print_out<T: Serialize>(
    json: bool,
    data: &[T],
    row: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&JsonOut { ok: true, data })?
        );
    } else {
        for d in data {
            println!("{}", row(d));
        }
    }
    Ok(())
}

/// Prints one document; `ok` reflects the outcome being reported.
pub fn print_status<T: Serialize>(
    json: bool,
    ok: bool,
    data: T,
    text: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&JsonOut { ok, data })?);
    } else {
        println!("{}", text(&data));
    }
    Ok(())
}

pub fn print_error(json: bool, err: &anyhow::Error) {
    if json {
        let body = serde_json::json!({ "ok": false, "error": format!("{err:#}") });
        println!("{body}");
    } else {
        eprintln!("error: {err:#}");
    }
}
