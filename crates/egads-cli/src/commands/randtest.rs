use std::path::Path;

use egads_core::Prng;
use egads_core::prng::DEFAULT_POLL_INTERVAL;
use egads_server::SocketGatherer;

/// Seed a generator from the daemon (or the fallback device) and print one
/// draw from every distribution.
pub fn run(socket: &Path, fallback: Option<&Path>) {
    let mut gatherer = SocketGatherer::new(socket);
    if let Some(f) = fallback {
        gatherer = gatherer.with_fallback(f);
    }
    let mut prng = match Prng::from_gatherer(Box::new(gatherer), DEFAULT_POLL_INTERVAL) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("egads: seeding generator: {e}");
            std::process::exit(1);
        }
    };

    for line in sample_lines(&mut prng) {
        println!("{line}");
    }

    let mut raw = [0u8; 16];
    match prng.entropy(&mut raw) {
        Ok(()) => println!("Raw entropy {}", super::client::hex(&raw)),
        Err(e) => println!("Raw entropy: failure: {e}"),
    }
    prng.destroy();
}

fn range_line(prng: &mut Prng, min: i64, max: i64) -> String {
    match prng.rand_range(min, max) {
        Ok(v) => format!("Random integer between {min} and {max} {v}"),
        Err(e) => format!("rand_range({min}, {max}): failure: {e}"),
    }
}

pub fn sample_lines(prng: &mut Prng) -> Vec<String> {
    vec![
        format!("Random unsigned integer {}", prng.rand_u32()),
        format!("Random long {}", prng.rand_u64()),
        format!("Random real {:.6}", prng.rand_real()),
        range_line(prng, 50, 300),
        range_line(prng, -50, 1000),
        format!("Random string {}", prng.rand_string(9)),
        format!("Random file name {}", prng.rand_fname(9)),
        format!("Gaussian (0, 1) {:.6}", prng.gauss(0.0, 1.0)),
        format!("Normal (0, 1) {:.6}", prng.normal(0.0, 1.0)),
        format!("Lognormal (0, 1) {:.6}", prng.lognormal(0.0, 1.0)),
        format!("Exponential (2) {:.6}", prng.expo(2.0)),
        format!("Beta (2, 3) {:.6}", prng.beta(2.0, 3.0)),
        format!("Pareto (3) {:.6}", prng.pareto(3.0)),
        format!("Weibull (1.5, 2) {:.6}", prng.weibull(1.5, 2.0)),
        format!("Uniform (2, 4) {:.6}", prng.uniform(2.0, 4.0)),
        format!("Circular uniform (1, pi) {:.6}", prng.cunif(1.0, std::f64::consts::PI)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use egads_core::SEED_LEN;

    #[test]
    fn test_every_distribution_reported() {
        let mut prng = Prng::new(&[3u8; SEED_LEN], DEFAULT_POLL_INTERVAL).unwrap();
        let lines = sample_lines(&mut prng);
        assert_eq!(lines.len(), 16);
        assert!(lines.iter().all(|l| !l.contains("failure")));
    }
}
