use crate::error::ResultsError;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MARK_MAX_HUNDREDTHS: u32 = 10_000;

/// Exam mark in [0, 100], held as integer hundredths so band boundaries
/// compare exactly (89.99 is 8999, never 89.98999...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mark(u32);

impl Mark {
    pub fn from_hundredths(hundredths: u32) -> Result<Self, ResultsError> {
        if hundredths > MARK_MAX_HUNDREDTHS {
            return Err(ResultsError::MarkOutOfRange(format_hundredths(
                hundredths as u64,
            )));
        }
        Ok(Self(hundredths))
    }

    pub fn new(value: f64) -> Result<Self, ResultsError> {
        if !value.is_finite() {
            return Err(ResultsError::MarkNotNumeric(value.to_string()));
        }
        if !(0.0..=100.0).contains(&value) {
            return Err(ResultsError::MarkOutOfRange(value.to_string()));
        }
        let scaled = value * 100.0;
        let rounded = scaled.round();
        // Tolerate binary noise (e.g. 0.29 * 100 = 28.999999999999996).
        if (scaled - rounded).abs() > 1e-6 {
            return Err(ResultsError::MarkPrecision(value.to_string()));
        }
        Self::from_hundredths(rounded as u32)
    }

    /// Accepts a JSON number or a decimal string.
    pub fn from_json(v: &serde_json::Value) -> Result<Self, ResultsError> {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Self::new(f),
                None => Err(ResultsError::MarkNotNumeric(n.to_string())),
            },
            serde_json::Value::String(s) => s.parse(),
            other => Err(ResultsError::MarkNotNumeric(other.to_string())),
        }
    }

    pub fn hundredths(self) -> u32 {
        self.0
    }

    pub fn value(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl FromStr for Mark {
    type Err = ResultsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        // A sign is only acceptable on zero.
        let (negative, body) = match t.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, t),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(ResultsError::MarkNotNumeric(t.to_string()));
        }

        let int_digits = int_part.trim_start_matches('0');
        if int_digits.len() > 3 {
            return Err(ResultsError::MarkOutOfRange(t.to_string()));
        }
        let whole: u32 = if int_digits.is_empty() {
            0
        } else {
            int_digits
                .parse()
                .map_err(|_| ResultsError::MarkNotNumeric(t.to_string()))?
        };

        let frac_sig = if frac_part.len() > 2 {
            if frac_part[2..].chars().any(|c| c != '0') {
                return Err(ResultsError::MarkPrecision(t.to_string()));
            }
            &frac_part[..2]
        } else {
            frac_part
        };
        let frac: u32 = match frac_sig.len() {
            0 => 0,
            1 => frac_sig.parse::<u32>().unwrap_or(0) * 10,
            _ => frac_sig.parse::<u32>().unwrap_or(0),
        };

        let hundredths = whole * 100 + frac;
        if negative && hundredths > 0 {
            return Err(ResultsError::MarkOutOfRange(t.to_string()));
        }
        Self::from_hundredths(hundredths).map_err(|_| ResultsError::MarkOutOfRange(t.to_string()))
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hundredths(self.0 as u64))
    }
}

impl Serialize for Mark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
}

/// Grade bands checked top-down; the first band whose lower bound (in
/// hundredths of a mark) is met wins.
pub const BANDS: [(u32, Grade); 10] = [
    (9000, Grade::APlus),
    (8500, Grade::A),
    (8000, Grade::AMinus),
    (7500, Grade::BPlus),
    (7000, Grade::B),
    (6500, Grade::BMinus),
    (6000, Grade::CPlus),
    (5500, Grade::C),
    (5000, Grade::D),
    (0, Grade::F),
];

impl Grade {
    pub const ALL: [Grade; 10] = [
        Grade::APlus,
        Grade::A,
        Grade::AMinus,
        Grade::BPlus,
        Grade::B,
        Grade::BMinus,
        Grade::CPlus,
        Grade::C,
        Grade::D,
        Grade::F,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }

    /// Display label with the whole-mark range, e.g. `A+ (90-100)`.
    pub fn label(self) -> &'static str {
        match self {
            Grade::APlus => "A+ (90-100)",
            Grade::A => "A (85-89)",
            Grade::AMinus => "A- (80-84)",
            Grade::BPlus => "B+ (75-79)",
            Grade::B => "B (70-74)",
            Grade::BMinus => "B- (65-69)",
            Grade::CPlus => "C+ (60-64)",
            Grade::C => "C (55-59)",
            Grade::D => "D (50-54)",
            Grade::F => "F (0-49)",
        }
    }

    /// Grade point in hundredths.
    fn point_hundredths(self) -> u32 {
        match self {
            Grade::APlus => 400,
            Grade::A => 370,
            Grade::AMinus => 330,
            Grade::BPlus => 300,
            Grade::B => 270,
            Grade::BMinus => 230,
            Grade::CPlus => 200,
            Grade::C => 170,
            Grade::D => 100,
            Grade::F => 0,
        }
    }

    pub fn point(self) -> f64 {
        self.point_hundredths() as f64 / 100.0
    }
}

impl FromStr for Grade {
    type Err = ResultsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        Grade::ALL
            .iter()
            .copied()
            .find(|g| g.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| ResultsError::UnknownGrade(t.to_string()))
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn grade_for(mark: Mark) -> Grade {
    let h = mark.hundredths();
    BANDS
        .iter()
        .find(|(min, _)| h >= *min)
        .map(|(_, g)| *g)
        .unwrap_or(Grade::F)
}

/// Grade point average in hundredths (2.67 is 267).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Gpa(u32);

impl Gpa {
    pub fn hundredths(self) -> u32 {
        self.0
    }

    pub fn value(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Gpa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_hundredths(self.0 as u64))
    }
}

impl Serialize for Gpa {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

/// Mean grade point to 2 decimals. Points are summed as `f64` in iteration
/// order and the quotient is rounded on its exact binary value, ties to even,
/// so results match the float arithmetic GPA reports have always shown
/// (`[A+, A+, A+, A]` is 3.92, `[A, F, F, F]` is 0.93). No grades gives 0.00.
pub fn gpa_for<I>(grades: I) -> Gpa
where
    I: IntoIterator<Item = Grade>,
{
    let mut sum = 0.0_f64;
    let mut count = 0u32;
    for g in grades {
        sum += g.point();
        count += 1;
    }
    if count == 0 {
        return Gpa(0);
    }
    Gpa(round_hundredths(sum / f64::from(count)))
}

/// `x * 100` rounded half-to-even, computed on the exact value of `x`
/// rather than on the (already rounded) product.
fn round_hundredths(x: f64) -> u32 {
    if !(x > 0.0) || !x.is_finite() {
        return 0;
    }
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exp) = if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), biased - 1075)
    };
    let scaled = u128::from(mantissa) * 100;
    let rounded = if exp >= 0 {
        if exp > 60 {
            return u32::MAX;
        }
        scaled << exp
    } else {
        let k = exp.unsigned_abs();
        if k >= 100 {
            return 0;
        }
        let q = scaled >> k;
        let r = scaled & ((1u128 << k) - 1);
        let half = 1u128 << (k - 1);
        if r > half || (r == half && q & 1 == 1) {
            q + 1
        } else {
            q
        }
    };
    u32::try_from(rounded).unwrap_or(u32::MAX)
}

fn format_hundredths(h: u64) -> String {
    format!("{}.{:02}", h / 100, h % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn m(s: &str) -> Mark {
        s.parse().expect("parse mark")
    }

    #[test]
    fn boundary_marks_resolve_to_the_higher_band() {
        assert_eq!(grade_for(m("90")), Grade::APlus);
        assert_eq!(grade_for(m("89.99")), Grade::A);
        assert_eq!(grade_for(m("85")), Grade::A);
        assert_eq!(grade_for(m("84.99")), Grade::AMinus);
        assert_eq!(grade_for(m("75")), Grade::BPlus);
        assert_eq!(grade_for(m("70")), Grade::B);
        assert_eq!(grade_for(m("65")), Grade::BMinus);
        assert_eq!(grade_for(m("60")), Grade::CPlus);
        assert_eq!(grade_for(m("55")), Grade::C);
        assert_eq!(grade_for(m("50")), Grade::D);
        assert_eq!(grade_for(m("49.99")), Grade::F);
        assert_eq!(grade_for(m("0")), Grade::F);
        assert_eq!(grade_for(m("100")), Grade::APlus);
    }

    #[test]
    fn float_marks_land_on_exact_hundredths() {
        assert_eq!(Mark::new(89.99).expect("mark").hundredths(), 8999);
        assert_eq!(Mark::new(0.29).expect("mark").hundredths(), 29);
        assert_eq!(grade_for(Mark::new(79.99).expect("mark")), Grade::BPlus);
    }

    #[test]
    fn mark_rejects_out_of_range_and_extra_precision() {
        assert!(matches!(
            Mark::new(100.01),
            Err(ResultsError::MarkOutOfRange(_))
        ));
        assert!(matches!(Mark::new(-0.5), Err(ResultsError::MarkOutOfRange(_))));
        assert!(matches!(Mark::new(12.345), Err(ResultsError::MarkPrecision(_))));
        assert!(matches!(
            Mark::new(f64::NAN),
            Err(ResultsError::MarkNotNumeric(_))
        ));
        assert!(matches!(
            "12.345".parse::<Mark>(),
            Err(ResultsError::MarkPrecision(_))
        ));
        assert!(matches!(
            "abc".parse::<Mark>(),
            Err(ResultsError::MarkNotNumeric(_))
        ));
        assert!(matches!(
            "100.5".parse::<Mark>(),
            Err(ResultsError::MarkOutOfRange(_))
        ));
        assert!(matches!(
            "1000".parse::<Mark>(),
            Err(ResultsError::MarkOutOfRange(_))
        ));
        assert!(matches!(
            "-0.01".parse::<Mark>(),
            Err(ResultsError::MarkOutOfRange(_))
        ));
        assert!(matches!(
            "-".parse::<Mark>(),
            Err(ResultsError::MarkNotNumeric(_))
        ));
    }

    #[test]
    fn negative_zero_is_zero() {
        assert_eq!(m("-0").hundredths(), 0);
        assert_eq!(m("-0.00").hundredths(), 0);
        assert_eq!(Mark::new(-0.0).expect("mark"), m("-0"));
        assert_eq!(grade_for(m("-0.00")), Grade::F);
    }

    #[test]
    fn mark_string_forms() {
        assert_eq!(m("72.5").hundredths(), 7250);
        assert_eq!(m(".5").hundredths(), 50);
        assert_eq!(m("007").hundredths(), 700);
        assert_eq!(m("88.100").hundredths(), 8810);
        assert_eq!(m("72.5").to_string(), "72.50");
        assert_eq!(
            Mark::from_json(&serde_json::json!("64.25")).expect("json string"),
            m("64.25")
        );
        assert_eq!(
            Mark::from_json(&serde_json::json!(64.25)).expect("json number"),
            m("64.25")
        );
        assert!(Mark::from_json(&serde_json::json!(null)).is_err());
    }

    #[test]
    fn gpa_examples() {
        assert_eq!(gpa_for(Vec::new()).to_string(), "0.00");
        assert_eq!(gpa_for([Grade::APlus, Grade::F]).to_string(), "2.00");
        assert_eq!(
            gpa_for([Grade::BPlus, Grade::B, Grade::BMinus]).to_string(),
            "2.67"
        );
        assert_eq!(gpa_for([Grade::A, Grade::AMinus]).hundredths(), 350);
    }

    #[test]
    fn gpa_rounds_half_up() {
        // 3.7 / 4 is just above 0.925 in binary.
        assert_eq!(
            gpa_for([Grade::A, Grade::F, Grade::F, Grade::F]).to_string(),
            "0.93"
        );
    }

    #[test]
    fn gpa_rounds_the_float_mean() {
        // 15.7 / 4 is just below 3.925 in binary.
        assert_eq!(
            gpa_for([Grade::APlus, Grade::APlus, Grade::APlus, Grade::A]).to_string(),
            "3.92"
        );
        assert_eq!(
            gpa_for([Grade::APlus, Grade::APlus, Grade::APlus, Grade::AMinus]).to_string(),
            "3.83"
        );
        // 17 / 8 = 2.125 exactly; the tie goes to the even digit.
        assert_eq!(
            gpa_for([
                Grade::APlus,
                Grade::APlus,
                Grade::APlus,
                Grade::APlus,
                Grade::D,
                Grade::F,
                Grade::F,
                Grade::F,
            ])
            .to_string(),
            "2.12"
        );
    }

    #[test]
    fn round_hundredths_edges() {
        assert_eq!(round_hundredths(0.0), 0);
        assert_eq!(round_hundredths(f64::NAN), 0);
        assert_eq!(round_hundredths(4.0), 400);
        assert_eq!(round_hundredths(0.125), 12);
        assert_eq!(round_hundredths(0.375), 38);
        assert_eq!(round_hundredths(8.0 / 3.0), 267);
    }

    #[test]
    fn every_band_grade_has_a_point_and_parses_back() {
        for (_, g) in BANDS {
            assert!(Grade::ALL.contains(&g));
            assert!(g.point() >= 0.0 && g.point() <= 4.0);
            assert_eq!(g.as_str().parse::<Grade>().expect("round trip"), g);
            assert!(g.label().starts_with(g.as_str()));
        }
        assert_eq!(Grade::AMinus.point(), 3.3);
        assert!(matches!(
            "E".parse::<Grade>(),
            Err(ResultsError::UnknownGrade(_))
        ));
    }

    #[test]
    fn grade_serializes_as_symbol() {
        assert_eq!(
            serde_json::to_value(Grade::BMinus).expect("serialize"),
            serde_json::json!("B-")
        );
        let g: Grade = serde_json::from_value(serde_json::json!("C+")).expect("deserialize");
        assert_eq!(g, Grade::CPlus);
    }

    proptest! {
        #[test]
        fn grade_is_monotone_in_mark(a in 0u32..=10_000, b in 0u32..=10_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let g_lo = grade_for(Mark::from_hundredths(lo).unwrap());
            let g_hi = grade_for(Mark::from_hundredths(hi).unwrap());
            prop_assert!(g_hi.point() >= g_lo.point());
        }

        #[test]
        fn grade_is_idempotent(h in 0u32..=10_000) {
            let mark = Mark::from_hundredths(h).unwrap();
            prop_assert_eq!(grade_for(mark), grade_for(mark));
            prop_assert!(Grade::ALL.contains(&grade_for(mark)));
        }

        #[test]
        fn gpa_stays_within_point_range(idx in proptest::collection::vec(0usize..10, 0..20)) {
            let gpa = gpa_for(idx.iter().map(|i| Grade::ALL[*i]));
            prop_assert!(gpa.hundredths() <= 400);
        }
    }
}
