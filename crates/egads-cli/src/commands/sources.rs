use egads_core::sources::all_sources;

/// List every gatherer and whether it can run here.
pub fn run(json: bool) {
    let sources = all_sources();
    if json {
        let entries: Vec<_> = sources
            .iter()
            .map(|s| {
                serde_json::json!({
                    "name": s.name(),
                    "kind": s.kind(),
                    "description": s.info().description,
                    "available": s.is_available(),
                    "timestamp_bits": s.kind().timestamp_estimate(),
                })
            })
            .collect();
        match serde_json::to_string_pretty(&entries) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("egads: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    println!("{:<16} {:<10} {:<10} DESCRIPTION", "NAME", "KIND", "AVAILABLE");
    for s in &sources {
        println!(
            "{:<16} {:<10} {:<10} {}",
            s.name(),
            s.kind().to_string(),
            if s.is_available() { "yes" } else { "no" },
            s.info().description
        );
    }
}
