//! Randomization helpers and timestamp formatting
//!
//! Random identities for form filling (usernames, passwords, birthdates)
//! plus the shared thread-local RNG helpers the interaction layer paces
//! itself with.

use chrono::{Datelike, Local, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use std::cell::RefCell;

// Thread-local RNG
thread_local! {
    static RNG: RefCell<rand::rngs::ThreadRng> = RefCell::new(rand::thread_rng());
}

/// Random integer in [min, max] inclusive; swapped bounds are tolerated
pub(crate) fn random_range(min: u64, max: u64) -> u64 {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    RNG.with(|rng| rng.borrow_mut().gen_range(min..=max))
}

/// Random float in [min, max)
pub(crate) fn random_f64_range(min: f64, max: f64) -> f64 {
    if min >= max {
        return min;
    }
    RNG.with(|rng| rng.borrow_mut().gen_range(min..max))
}

/// Biased coin flip
pub(crate) fn random_bool(probability: f64) -> bool {
    RNG.with(|rng| rng.borrow_mut().gen_bool(probability))
}

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_";

fn pick(charset: &[u8]) -> char {
    let index = random_range(0, charset.len() as u64 - 1) as usize;
    charset[index] as char
}

/// Random lowercase alphanumeric string of the given length
pub fn random_string(len: usize) -> String {
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        if random_bool(0.7) {
            out.push(pick(LOWER));
        } else {
            out.push(pick(DIGITS));
        }
    }
    out
}

/// Random digit string of the given length
pub fn random_digits(len: usize) -> String {
    (0..len).map(|_| pick(DIGITS)).collect()
}

/// Random plausible username: a lowercase word plus a numeric suffix
pub fn random_username() -> String {
    let word_len = random_range(5, 9) as usize;
    let word: String = (0..word_len).map(|_| pick(LOWER)).collect();
    let suffix_len = random_range(2, 4) as usize;
    format!("{}{}", word, random_digits(suffix_len))
}

/// Random password with at least one lower, upper, digit and symbol
///
/// `len` is clamped to a minimum of 8.
pub fn random_password(len: usize) -> String {
    let len = len.max(8);

    let mut chars: Vec<char> = vec![pick(LOWER), pick(UPPER), pick(DIGITS), pick(SYMBOLS)];
    while chars.len() < len {
        let class = match random_range(0, 3) {
            0 => LOWER,
            1 => UPPER,
            2 => DIGITS,
            _ => SYMBOLS,
        };
        chars.push(pick(class));
    }

    RNG.with(|rng| chars.shuffle(&mut *rng.borrow_mut()));
    chars.into_iter().collect()
}

/// Random birthdate for someone between `min_age` and `max_age` years old
///
/// Days are drawn from 1..=28 so every month is valid.
pub fn random_birthdate(min_age: u32, max_age: u32) -> NaiveDate {
    let (min_age, max_age) = if min_age <= max_age {
        (min_age, max_age)
    } else {
        (max_age, min_age)
    };

    let current_year = Local::now().year();
    let age = random_range(min_age as u64, max_age as u64) as i32;
    let year = current_year - age;
    let month = random_range(1, 12) as u32;
    let day = random_range(1, 28) as u32;

    // Month and day ranges above keep this constructible for any year.
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, 1, 1).expect("jan 1 is always valid"))
}

/// Current local time as `YYYY-MM-DD HH:MM:SS`
pub fn format_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Birthday as the long form webmail signup pages expect, e.g. `March 7, 1992`
pub fn format_birthday(date: NaiveDate) -> String {
    format!("{} {}, {}", date.format("%B"), date.day(), date.year())
}
