// Copyright (c) 2025 RIVERMETER CONTROL SYSTEMS
//
// Licensed under the MIT License. See LICENSE for details.

//! Parser for the schedule grammar (cohort declarations, max-power
//! assignments, slot lines, and `config` tunable overrides). Errors are
//! collected rather than returned fail-fast, so a caller can report every
//! problem in one pass.

use std::collections::HashMap;
use std::time::Duration;

use hydro_types::{Config, HydroError, ParseError, RelayConfig, RelayMode, Slot, SlotKind, TimeOfDay};

struct CohortBuilder {
    canonical: String,
    short: Option<String>,
    relays: Vec<u8>,
    mode: RelayMode,
    in_use_slots: Vec<Slot>,
}

/// Parse schedule text into a validated [`Config`].
///
/// On any problem, parsing continues to the end of the input and every
/// problem found is returned together as `HydroError::Parse`.
pub fn parse(text: &str) -> Result<Config, HydroError> {
    let mut errors: Vec<ParseError> = Vec::new();
    let mut cohorts: Vec<CohortBuilder> = Vec::new();
    let mut name_index: HashMap<String, usize> = HashMap::new();
    let mut relay_owner: HashMap<u8, usize> = HashMap::new();
    let mut max_power: HashMap<u8, u32> = HashMap::new();
    let mut tunables = hydro_types::EngineTunables::default();

    let mut offset = 0usize;
    for raw_line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += raw_line.len();
        let line = raw_line.trim_end_matches(['\n', '\r']);

        let content = strip_comment(line);
        let trimmed = content.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lead_ws = content.len() - content.trim_start().len();
        let stmt_start_in_line = lead_ws;
        let stmt = trimmed.trim_end_matches('.').trim_end();
        let lower = stmt.to_ascii_lowercase();

        if let Some(rest) = strip_keyword(&lower, "config") {
            let rest_offset = line_start + stmt_start_in_line + (stmt.len() - rest.len());
            parse_config_line(stmt, rest, rest_offset, &mut tunables, &mut errors);
            continue;
        }

        if let Some((name_idx, rest_byte_offset)) = match_cohort_prefix(stmt, &lower, &name_index) {
            parse_slot_line(
                stmt,
                rest_byte_offset,
                line_start,
                name_idx,
                &mut cohorts,
                &mut errors,
            );
            continue;
        }

        if let Some(rest) = strip_keyword(&lower, "relay").or_else(|| strip_keyword(&lower, "relays")) {
            let consumed = stmt.len() - rest.len();
            match parse_relay_list(&stmt[consumed..]) {
                Ok((relays, list_consumed)) => {
                    let after = stmt[consumed + list_consumed..].trim_start();
                    let after_lower = after.to_ascii_lowercase();
                    let after_offset = line_start + stmt_start_in_line + (stmt.len() - after.len());

                    if let Some(name_part) = strip_keyword(&after_lower, "is").or_else(|| strip_keyword(&after_lower, "are"))
                    {
                        let consumed2 = after.len() - name_part.len();
                        declare_cohort(
                            after[consumed2..].trim(),
                            relays,
                            line_start + stmt_start_in_line + (stmt.len() - after.len()) + consumed2,
                            &mut cohorts,
                            &mut name_index,
                            &mut relay_owner,
                            &mut errors,
                        );
                    } else if let Some(power_part) =
                        strip_keyword(&after_lower, "has").or_else(|| strip_keyword(&after_lower, "have"))
                    {
                        let consumed2 = after.len() - power_part.len();
                        parse_max_power_line(
                            after[consumed2..].trim(),
                            &relays,
                            after_offset + consumed2,
                            &mut max_power,
                            &mut errors,
                        );
                    } else {
                        errors.push(ParseError::new(
                            after_offset..(after_offset + after.len()),
                            "expected 'is', 'are', 'has', or 'have' after relay list",
                        ));
                    }
                }
                Err(msg) => {
                    errors.push(ParseError::new(
                        (line_start + stmt_start_in_line + consumed)..(line_start + line.len()),
                        msg,
                    ));
                }
            }
            continue;
        }

        errors.push(ParseError::new(
            (line_start + stmt_start_in_line)..(line_start + stmt_start_in_line + stmt.len()),
            "unrecognized line: expected a cohort declaration, max-power assignment, slot rule, or config line",
        ));
    }

    if !errors.is_empty() {
        return Err(HydroError::Parse { errors });
    }

    let mut config = Config::new();
    for cohort in &cohorts {
        for &relay in &cohort.relays {
            config.set_relay(
                relay,
                RelayConfig {
                    mode: cohort.mode,
                    max_power_watts: max_power.get(&relay).copied().unwrap_or(0),
                    in_use_slots: cohort.in_use_slots.clone(),
                    not_in_use_slots: Vec::new(),
                    cohort_name: cohort.canonical.clone(),
                },
            );
        }
    }
    config.tunables = tunables;
    Ok(config)
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

/// If `lower` starts with `keyword` followed by whitespace or end-of-string,
/// returns the byte-aligned remainder of `lower` (same indices apply to the
/// original-case string, since the only case-folding performed is ASCII).
fn strip_keyword<'a>(lower: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = lower.strip_prefix(keyword)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn declare_cohort(
    rest: &str,
    relays: Vec<u8>,
    rest_byte_offset: usize,
    cohorts: &mut Vec<CohortBuilder>,
    name_index: &mut HashMap<String, usize>,
    relay_owner: &mut HashMap<u8, usize>,
    errors: &mut Vec<ParseError>,
) {
    let (short, canonical) = match (rest.find('('), rest.ends_with(')')) {
        (Some(open), true) => {
            let short = rest[..open].trim();
            let canonical = rest[open + 1..rest.len() - 1].trim();
            (if short.is_empty() { None } else { Some(short.to_string()) }, canonical)
        }
        _ => (None, rest),
    };

    if canonical.is_empty() {
        errors.push(ParseError::new(
            rest_byte_offset..(rest_byte_offset + rest.len()),
            "cohort declaration is missing a name",
        ));
        return;
    }

    let canonical_key = canonical.to_ascii_lowercase();
    if name_index.contains_key(&canonical_key) {
        errors.push(ParseError::new(
            rest_byte_offset..(rest_byte_offset + rest.len()),
            format!("duplicate cohort name '{canonical}'"),
        ));
        return;
    }
    if let Some(short) = &short {
        if name_index.contains_key(&short.to_ascii_lowercase()) {
            errors.push(ParseError::new(
                rest_byte_offset..(rest_byte_offset + rest.len()),
                format!("duplicate cohort name '{short}'"),
            ));
            return;
        }
    }

    for &relay in &relays {
        if relay_owner.contains_key(&relay) {
            errors.push(ParseError::new(
                rest_byte_offset..(rest_byte_offset + rest.len()),
                format!("relay {relay} is already declared in another cohort"),
            ));
            return;
        }
    }

    let idx = cohorts.len();
    for &relay in &relays {
        relay_owner.insert(relay, idx);
    }
    name_index.insert(canonical_key, idx);
    if let Some(short) = &short {
        name_index.insert(short.to_ascii_lowercase(), idx);
    }
    cohorts.push(CohortBuilder {
        canonical: canonical.to_string(),
        short,
        relays,
        mode: RelayMode::AlwaysOff,
        in_use_slots: Vec::new(),
    });
}

/// Parses a comma/"and"-separated list of relay numbers starting at the
/// beginning of `s`. Returns the parsed relays and the number of bytes of
/// `s` consumed by the list (stopping at the first token that is not a
/// digit, comma, or "and").
fn parse_relay_list(s: &str) -> Result<(Vec<u8>, usize), String> {
    let mut relays = Vec::new();
    let mut consumed = 0usize;
    let mut rest = s;

    loop {
        let trimmed = rest.trim_start();
        consumed += rest.len() - trimmed.len();
        rest = trimmed;

        let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits_end == 0 {
            break;
        }
        let n: u32 = rest[..digits_end].parse().map_err(|_| "invalid relay number".to_string())?;
        let relay = u8::try_from(n).map_err(|_| format!("relay number {n} out of range"))?;
        if usize::from(relay) >= hydro_types::MAX_RELAYS {
            return Err(format!("relay number {relay} out of range"));
        }
        relays.push(relay);
        consumed += digits_end;
        rest = &rest[digits_end..];

        let trimmed = rest.trim_start();
        consumed += rest.len() - trimmed.len();
        rest = trimmed;

        if let Some(r) = rest.strip_prefix(',') {
            rest = r;
            consumed += 1;
            continue;
        }
        let lower = rest.to_ascii_lowercase();
        if let Some(r) = strip_keyword(&lower, "and") {
            let and_len = rest.len() - r.len();
            rest = &rest[and_len..];
            consumed += and_len;
            continue;
        }
        break;
    }

    if relays.is_empty() {
        return Err("expected a relay number".to_string());
    }
    Ok((relays, consumed))
}

/// A max-power line may reference a relay that has no cohort at all (the
/// reference schedule in spec §6 does exactly this for relays 7 and 8,
/// which are never declared). Such a value is simply inert: only relays
/// that end up in some cohort are materialized into the final `Config`, so
/// an orphan max-power assignment has no observable effect.
fn parse_max_power_line(
    rest: &str,
    relays: &[u8],
    rest_offset: usize,
    max_power: &mut HashMap<u8, u32>,
    errors: &mut Vec<ParseError>,
) {
    let lower = rest.to_ascii_lowercase();
    let value_part = strip_keyword(&lower, "max")
        .and_then(|r| strip_keyword(r, "power"))
        .or_else(|| strip_keyword(&lower, "maxpower"))
        .or_else(|| strip_keyword(&lower, "maximum").and_then(|r| strip_keyword(r, "power")));

    let Some(value_lower) = value_part else {
        errors.push(ParseError::new(
            rest_offset..(rest_offset + rest.len()),
            "expected 'max power', 'maxpower', or 'maximum power'",
        ));
        return;
    };
    let value_offset = rest_offset + (rest.len() - value_lower.len());
    let value_text = &rest[rest.len() - value_lower.len()..];

    match parse_power_watts(value_text.trim()) {
        Ok(watts) => {
            for &relay in relays {
                max_power.insert(relay, watts);
            }
        }
        Err(msg) => errors.push(ParseError::new(value_offset..(value_offset + value_text.len()), msg)),
    }
}

/// Parses a power literal like `500w`, `2kw`, `1.5kw`, `3MW`.
pub fn parse_power_watts(s: &str) -> Result<u32, String> {
    let lower = s.trim().to_ascii_lowercase();
    let (number_part, scale) = if let Some(n) = lower.strip_suffix("mw") {
        (n, 1_000_000.0)
    } else if let Some(n) = lower.strip_suffix("kw") {
        (n, 1_000.0)
    } else if let Some(n) = lower.strip_suffix('w') {
        (n, 1.0)
    } else {
        return Err(format!("expected a power value with unit w/kw/mw, got '{s}'"));
    };
    let value: f64 = number_part.trim().parse().map_err(|_| format!("invalid power value '{s}'"))?;
    if value < 0.0 {
        return Err(format!("power value must be non-negative, got '{s}'"));
    }
    Ok((value * scale).round() as u32)
}

/// Parses a chained duration literal like `20m`, `2h`, `2h30m`, `5s`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let mut rest = s.trim();
    if rest.is_empty() {
        return Err("expected a duration".to_string());
    }
    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits_end = rest.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(format!("invalid duration '{s}'"));
        }
        let value: f64 = rest[..digits_end].parse().map_err(|_| format!("invalid duration '{s}'"))?;
        let unit_start = &rest[digits_end..];
        let mut chars = unit_start.chars();
        let unit = chars.next().ok_or_else(|| format!("invalid duration '{s}'"))?;
        let seconds = match unit.to_ascii_lowercase() {
            'h' => value * 3600.0,
            'm' => value * 60.0,
            's' => value,
            _ => return Err(format!("invalid duration unit in '{s}'")),
        };
        total += Duration::from_secs_f64(seconds);
        rest = chars.as_str();
    }
    Ok(total)
}

/// Longest-prefix match of a known cohort name (short or canonical) at the
/// start of `stmt`. Returns the cohort index and the byte offset into the
/// whole document where the remainder of the statement begins.
fn match_cohort_prefix(stmt: &str, lower: &str, name_index: &HashMap<String, usize>) -> Option<(usize, usize)> {
    let mut candidates: Vec<&String> = name_index.keys().collect();
    candidates.sort_by_key(|k| std::cmp::Reverse(k.len()));
    for key in candidates {
        if let Some(rest) = strip_keyword(lower, key) {
            let idx = name_index[key];
            let consumed = stmt.len() - rest.len();
            return Some((idx, consumed));
        }
    }
    None
}

fn parse_slot_line(
    stmt: &str,
    consumed: usize,
    line_start: usize,
    cohort_idx: usize,
    cohorts: &mut [CohortBuilder],
    errors: &mut Vec<ParseError>,
) {
    let rest = stmt[consumed..].trim_start();
    let rest_offset = line_start + (stmt.len() - rest.len());
    let lower = rest.to_ascii_lowercase();

    // "[is|are] on" with nothing further -> AlwaysOn.
    let after_copula = strip_keyword(&lower, "is").or_else(|| strip_keyword(&lower, "are")).unwrap_or(&lower);
    if after_copula.trim() == "on" {
        cohorts[cohort_idx].mode = RelayMode::AlwaysOn;
        return;
    }

    let after_copula = strip_keyword(&lower, "is").or_else(|| strip_keyword(&lower, "are"));
    let remainder_lower = after_copula.unwrap_or(&lower);
    let consumed_copula = lower.len() - remainder_lower.len();
    let mut remainder = &rest[consumed_copula..];
    let mut remainder_lower = remainder_lower;

    if let Some(r) = strip_keyword(remainder_lower, "on") {
        let on_len = remainder_lower.len() - r.len();
        remainder = &remainder[on_len..];
        remainder_lower = r;
    }

    let (start, end) = if let Some(after_from) = strip_keyword(remainder_lower, "from") {
        let from_len = remainder_lower.len() - after_from.len();
        remainder = &remainder[from_len..];
        remainder_lower = after_from;

        let to_idx = match remainder_lower.find(" to ") {
            Some(i) => i,
            None => {
                errors.push(ParseError::new(rest_offset..(rest_offset + rest.len()), "expected 'to' in time range"));
                return;
            }
        };
        let t1_text = remainder[..to_idx].trim();
        let start = match TimeOfDay::parse(t1_text) {
            Ok(t) => t,
            Err(e) => {
                errors.push(ParseError::new(rest_offset..(rest_offset + rest.len()), e.to_string()));
                return;
            }
        };
        let after_to = &remainder[to_idx + 4..];
        let after_to_lower = &remainder_lower[to_idx + 4..];

        let for_idx = after_to_lower.find(" for ");
        let (t2_text, tail, tail_lower) = match for_idx {
            Some(i) => (after_to[..i].trim(), &after_to[i + 1..], &after_to_lower[i + 1..]),
            None => (after_to.trim(), "", ""),
        };
        let end = match TimeOfDay::parse(t2_text) {
            Ok(t) => t,
            Err(e) => {
                errors.push(ParseError::new(rest_offset..(rest_offset + rest.len()), e.to_string()));
                return;
            }
        };
        remainder = tail;
        remainder_lower = tail_lower;
        (Some(start), Some(end))
    } else {
        (None, None)
    };

    let (kind, duration) = if let Some(after_for) = strip_keyword(remainder_lower, "for") {
        let for_len = remainder_lower.len() - after_for.len();
        remainder = &remainder[for_len..];
        remainder_lower = after_for;

        let kind = if let Some(r) = strip_keyword(remainder_lower, "at least") {
            remainder = &remainder[remainder_lower.len() - r.len()..];
            SlotKind::AtLeast
        } else if let Some(r) = strip_keyword(remainder_lower, "at most") {
            remainder = &remainder[remainder_lower.len() - r.len()..];
            SlotKind::AtMost
        } else {
            SlotKind::Exactly
        };

        match parse_duration(remainder.trim()) {
            Ok(d) => (kind, d),
            Err(e) => {
                errors.push(ParseError::new(rest_offset..(rest_offset + rest.len()), e));
                return;
            }
        }
    } else if start.is_some() {
        (SlotKind::Continuous, Duration::ZERO)
    } else {
        errors.push(ParseError::new(
            rest_offset..(rest_offset + rest.len()),
            "expected 'on', 'for DURATION', or 'from T1 to T2'",
        ));
        return;
    };

    let (start, end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => (TimeOfDay::MIDNIGHT, TimeOfDay::MIDNIGHT),
    };

    let slot = Slot::new(start, end, kind, duration);
    let bounded_duration = slot.length().to_std().unwrap_or(Duration::ZERO);
    if kind != SlotKind::Continuous && slot.duration > bounded_duration {
        errors.push(ParseError::new(
            rest_offset..(rest_offset + rest.len()),
            format!(
                "quota duration exceeds slot length ({} > {})",
                slot.duration.as_secs(),
                bounded_duration.as_secs()
            ),
        ));
        return;
    }

    let cohort = &mut cohorts[cohort_idx];
    for existing in &cohort.in_use_slots {
        if existing.overlaps(&slot) {
            errors.push(ParseError::new(
                rest_offset..(rest_offset + rest.len()),
                format!("time slot overlaps slot from {} to {}", existing.start, existing.end),
            ));
            return;
        }
    }
    cohort.mode = RelayMode::InUse;
    cohort.in_use_slots.push(slot);
}

fn parse_config_line(
    _stmt: &str,
    rest: &str,
    rest_offset: usize,
    tunables: &mut hydro_types::EngineTunables,
    errors: &mut Vec<ParseError>,
) {
    let lower = rest.to_ascii_lowercase();
    let (field, duration_text) = if let Some(r) = strip_keyword(&lower, "fastest") {
        ("fastest", &rest[rest.len() - r.len()..])
    } else if let Some(r) = strip_keyword(&lower, "reaction") {
        ("reaction", &rest[rest.len() - r.len()..])
    } else if let Some(r) = strip_keyword(&lower, "cycle") {
        ("cycle", &rest[rest.len() - r.len()..])
    } else {
        errors.push(ParseError::new(
            rest_offset..(rest_offset + rest.len()),
            "expected 'fastest', 'reaction', or 'cycle' after 'config'",
        ));
        return;
    };

    match parse_duration(duration_text.trim()) {
        Ok(d) => match field {
            "fastest" => tunables.minimum_change_duration = d,
            "reaction" => tunables.meter_reaction_duration = d,
            "cycle" => tunables.cycle_duration = d,
            _ => unreachable!(),
        },
        Err(e) => errors.push(ParseError::new(rest_offset..(rest_offset + duration_text.len()), e)),
    }
}
