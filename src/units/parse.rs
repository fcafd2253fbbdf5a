use super::{Measure, Unit, UnitError, UnitKind, UnitRatio};

/// Parse `<number> <unit> [/ <number> <unit>]`.
pub fn parse(src: &str) -> Result<Measure, UnitError> {
    let src = src.trim();
    if src.is_empty() {
        return Err(UnitError::Empty);
    }
    let mut parts = src.split('/');
    let top = parts.next().unwrap_or_default();
    let bot = parts.next();
    if parts.next().is_some() {
        return Err(UnitError::DoubleDivision(src.to_string()));
    }
    let top = parse_term(top, src)?;
    match bot {
        None => Ok(Measure::Unit(top)),
        Some(b) => {
            let bot = parse_term(b, src)?;
            if bot.value == 0.0 {
                return Err(UnitError::ZeroDenominator(src.to_string()));
            }
            Ok(Measure::Ratio(UnitRatio::new(top, bot)))
        }
    }
}

/// Parse a single quantity and convert it into `unit`.
///
/// In non-strict mode, a bare number adopts `unit` and a ratio whose units compact to a
/// scalar is accepted as that scalar.
pub fn parse_as(src: &str, unit: UnitKind, strict: bool) -> Result<Unit, UnitError> {
    match parse(src)? {
        Measure::Unit(u) if u.unit == UnitKind::None && !strict => Ok(Unit::new(u.value, unit)),
        Measure::Unit(u) => u.to(unit),
        Measure::Ratio(r) if !strict => match r.compact() {
            Some(v) if unit == UnitKind::None => Ok(Unit::new(v, unit)),
            _ => Err(UnitError::NotAUnit(src.to_string())),
        },
        Measure::Ratio(_) => Err(UnitError::NotAUnit(src.to_string())),
    }
}

/// Parse a ratio and express it in `top / bot` units.
///
/// In non-strict mode, an inverted ratio (`bot / top`) is accepted and inverted, and a bare
/// number is read as already expressed in `top / bot`.
pub fn parse_as_ratio(
    src: &str,
    top: UnitKind,
    bot: UnitKind,
    strict: bool,
) -> Result<UnitRatio, UnitError> {
    match parse(src)? {
        Measure::Ratio(r) => match r.to(top, bot) {
            Ok(r) => Ok(r),
            Err(e) if strict => Err(e),
            Err(e) => r.inverse().to(top, bot).map_err(|_| e),
        },
        Measure::Unit(u) if !strict && u.unit == UnitKind::None => Ok(UnitRatio::new(
            Unit::new(u.value, top),
            Unit::new(1.0, bot),
        )),
        Measure::Unit(_) => Err(UnitError::NotARatio(src.to_string())),
    }
}

fn parse_term(term: &str, full: &str) -> Result<Unit, UnitError> {
    let mut value: Option<f64> = None;
    let mut unit: Option<UnitKind> = None;
    for tok in split_tokens(term) {
        if let Ok(v) = tok.parse::<f64>() {
            if value.is_some() || unit.is_some() {
                return Err(UnitError::MultiNumber(full.to_string()));
            }
            if !v.is_finite() {
                return Err(UnitError::MalformedToken(tok.to_string()));
            }
            value = Some(v);
        } else if let Some(u) = UnitKind::from_token(&tok.to_ascii_lowercase()) {
            if unit.is_some() {
                return Err(UnitError::MalformedToken(tok.to_string()));
            }
            unit = Some(u);
        } else {
            return Err(UnitError::MalformedToken(tok.to_string()));
        }
    }
    match (value, unit) {
        (Some(v), u) => Ok(Unit::new(v, u.unwrap_or(UnitKind::None))),
        // A lone unit means one of it ("mm" == "1 mm").
        (None, Some(u)) => Ok(Unit::new(1.0, u)),
        (None, None) => Err(UnitError::Empty),
    }
}

/// Split on whitespace and at number/letter boundaries ("5mm" -> "5", "mm").
fn split_tokens(term: &str) -> Vec<&str> {
    let mut out = Vec::new();
    for word in term.split_whitespace() {
        let bytes = word.as_bytes();
        let cut = bytes
            .iter()
            .position(|b| b.is_ascii_alphabetic() && *b != b'e' && *b != b'E')
            .filter(|&i| i > 0);
        match cut {
            Some(i) if word[..i].parse::<f64>().is_ok() => {
                out.push(&word[..i]);
                out.push(&word[i..]);
            }
            _ => out.push(word),
        }
    }
    out
}
