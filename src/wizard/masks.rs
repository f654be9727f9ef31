//! Input masks for Brazilian document, phone and postal-code fields.
//!
//! Every mask strips non-digits before formatting, so re-applying a mask to
//! its own output is a no-op.

/// Formatting applied to a field value on every edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mask {
    /// `00000-000`
    Cep,
    /// `000.000.000-00`
    Cpf,
    /// `00.000.000/0000-00`
    Cnpj,
    /// `(00) 0000-0000` or `(00) 00000-0000`
    Phone,
    Digits,
}

impl Mask {
    pub fn apply(self, input: &str) -> String {
        match self {
            Mask::Cep => format_cep(input),
            Mask::Cpf => format_cpf(input),
            Mask::Cnpj => format_cnpj(input),
            Mask::Phone => format_phone(input),
            Mask::Digits => digits_only(input),
        }
    }
}

pub fn digits_only(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

pub fn format_cep(input: &str) -> String {
    group(&capped_digits(input, 8), &[5, 3], &["-"])
}

pub fn format_cpf(input: &str) -> String {
    group(&capped_digits(input, 11), &[3, 3, 3, 2], &[".", ".", "-"])
}

pub fn format_cnpj(input: &str) -> String {
    group(&capped_digits(input, 14), &[2, 3, 3, 4, 2], &[".", ".", "/", "-"])
}

pub fn format_phone(input: &str) -> String {
    let digits = capped_digits(input, 11);
    if digits.len() < 6 {
        return digits;
    }
    let middle = if digits.len() <= 10 { 4 } else { 5 };
    let (area, rest) = digits.split_at(2);
    let (first, last) = rest.split_at(middle.min(rest.len()));
    format!("({area}) {first}-{last}")
}

fn capped_digits(input: &str, max: usize) -> String {
    digits_only(input).chars().take(max).collect()
}

/// Splits `digits` into consecutive groups, placing `separators[i]` before group `i + 1`.
fn group(digits: &str, sizes: &[usize], separators: &[&str]) -> String {
    let mut out = String::with_capacity(digits.len() + separators.len());
    let mut rest = digits;
    for (index, size) in sizes.iter().enumerate() {
        if rest.is_empty() {
            break;
        }
        if index > 0 {
            out.push_str(separators[index - 1]);
        }
        let take = (*size).min(rest.len());
        out.push_str(&rest[..take]);
        rest = &rest[take..];
    }
    out
}
