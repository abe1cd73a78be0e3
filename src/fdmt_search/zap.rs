use anyhow::{anyhow, Result};

/// Parse `MIN,MAX` channel ranges (inclusive) given on the command line.
pub fn parse_zap_ranges(zap_args: &[String]) -> Result<Vec<(usize, usize)>> {
    let mut ranges = Vec::with_capacity(zap_args.len());
    for pair in zap_args {
        let parts: Vec<&str> = pair.split(',').map(str::trim).collect();
        if parts.len() != 2 {
            return Err(anyhow!(
                "invalid --zap value '{pair}'; expected MIN,MAX channel indices"
            ));
        }
        let lo: usize = parts[0]
            .parse()
            .map_err(|_| anyhow!("invalid channel index for --zap min: {}", parts[0]))?;
        let hi: usize = parts[1]
            .parse()
            .map_err(|_| anyhow!("invalid channel index for --zap max: {}", parts[1]))?;
        if lo > hi {
            return Err(anyhow!("invalid --zap range: min ({lo}) > max ({hi})"));
        }
        ranges.push((lo, hi));
    }
    Ok(ranges)
}
