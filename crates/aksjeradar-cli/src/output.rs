use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::metadata::Envelope;

pub fn render(envelope: &Envelope, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => render_table(envelope)?,
    }

    Ok(())
}

fn render_table(envelope: &Envelope) -> Result<(), CliError> {
    println!("request_id  : {}", envelope.meta.request_id);
    println!("generated_at: {}", envelope.meta.generated_at);
    println!(
        "origins     : {}",
        envelope
            .meta
            .origins
            .iter()
            .map(|origin| origin.label())
            .collect::<Vec<_>>()
            .join(",")
    );
    println!("latency_ms  : {}", envelope.meta.latency_ms);
    println!("cache_hit   : {}", envelope.meta.cache_hit);

    if !envelope.meta.warnings.is_empty() {
        println!("warnings:");
        for warning in &envelope.meta.warnings {
            println!("  - {warning}");
        }
    }

    println!("data:");
    let pretty_data = serde_json::to_string_pretty(&envelope.data)?;
    for line in pretty_data.lines() {
        println!("  {line}");
    }

    if !envelope.attempts.is_empty() {
        println!("attempts:");
        for attempt in &envelope.attempts {
            println!(
                "  - {} {}",
                attempt.provider,
                serde_json::to_string(&attempt.outcome)?
            );
        }
    }

    Ok(())
}
