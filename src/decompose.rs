//! Response decomposition: one freeform completion in, exactly `n` aligned
//! question/answer pairs out.
//!
//! Three strategies are available (see `ParsingStrategy`). Whatever the strategy,
//! the result is trimmed and then truncated or padded to `n` entries on both
//! sides, so callers can always index `questions[i]` / `answers[i]` together.
//!
//! Sentinels:
//!   - `ANSWER_NOT_AVAILABLE`: an item was found but carried no answer.
//!   - `ANSWER_NOT_FOUND`: the separator split found no answer marker at all.
//!   - `PAD_QUESTION` / `PAD_ANSWER`: nothing was extracted for this slot.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::ExerciseSet;

pub const ANSWER_NOT_AVAILABLE: &str = "answer not available";
pub const ANSWER_NOT_FOUND: &str = "answer not found";
pub const PAD_QUESTION: &str = "additional question";
pub const PAD_ANSWER: &str = "additional answer";

/// Separators tried in order by the simple strategy.
const SEPARATORS: [&str; 2] = ["Jawaban:", "Answers:"];

// "12." at start of input or after whitespace; the char after the period is checked separately.
static ITEM_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\s)\d+\.").unwrap());
static JAWABAN_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)\*{0,2}\bjawaban\*{0,2}[ \t]*:\*{0,2}").unwrap());
// "Answer:" synonym, only as a label: at a line start or right after a sentence ends.
static ANSWER_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?m)(?:^|[.?!]\s+)[ \t]*(\*{0,2}(?:Answers?|ANSWERS?)\*{0,2}[ \t]*:\*{0,2})").unwrap()
});
// A line holding nothing but an answer-section header, e.g. "Answers:" or "Answer Key:".
static ANSWER_SECTION_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?im)^[ \t*#]*(?:jawaban|answers?|answer key)[ \t*]*:[ \t*]*$").unwrap());
static LEADING_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+\.(?:\s|$)").unwrap());
static NUMBER_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}[.)]?$").unwrap());
static NUMBERED_TEXT_LINE_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\d{1,2}[.)]\s+(\S.*)$").unwrap());

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStrategy {
  /// Split once on the first answer separator; one combined pair.
  Simple,
  /// Line-by-line state machine over numbering and answer lines.
  LineScan,
  /// Numbered-item extraction with per-item answer splitting.
  #[default]
  PatternExtract,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Decomposer {
  pub strategy: ParsingStrategy,
  pub shuffle: bool,
}

impl Decomposer {
  pub fn new(strategy: ParsingStrategy, shuffle: bool) -> Self {
    Self { strategy, shuffle }
  }

  pub fn decompose(&self, text: &str, n: usize) -> ExerciseSet {
    self.decompose_with_rng(text, n, &mut rand::thread_rng())
  }

  #[instrument(level = "debug", skip(self, text, rng), fields(strategy = ?self.strategy, text_len = text.len()))]
  pub fn decompose_with_rng<R: Rng + ?Sized>(&self, text: &str, n: usize, rng: &mut R) -> ExerciseSet {
    let (questions, answers) = match self.strategy {
      ParsingStrategy::Simple => split_on_separator(text),
      ParsingStrategy::LineScan => scan_lines(text),
      ParsingStrategy::PatternExtract => extract_numbered(text),
    };
    debug!(target: "exercise", extracted_questions = questions.len(), extracted_answers = answers.len(), "Decomposed model output");

    let mut set = ExerciseSet {
      questions: fit_to(questions, n, PAD_QUESTION),
      answers: fit_to(answers, n, PAD_ANSWER),
    };
    if self.shuffle {
      shuffle_pairs(&mut set, rng);
    }
    set
  }
}

/// Trim every entry, then truncate or right-pad with `pad` to exactly `n`.
fn fit_to(items: Vec<String>, n: usize, pad: &str) -> Vec<String> {
  let mut out: Vec<String> = items.into_iter().take(n).map(|s| s.trim().to_string()).collect();
  out.resize(n, pad.to_string());
  out
}

/// Permute the pairs as units, keeping `answers[i]` with `questions[i]`.
fn shuffle_pairs<R: Rng + ?Sized>(set: &mut ExerciseSet, rng: &mut R) {
  let mut pairs: Vec<(String, String)> = std::mem::take(&mut set.questions)
    .into_iter()
    .zip(std::mem::take(&mut set.answers))
    .collect();
  pairs.shuffle(rng);
  let (questions, answers) = pairs.into_iter().unzip();
  set.questions = questions;
  set.answers = answers;
}

// --- Simple ---

fn split_on_separator(text: &str) -> (Vec<String>, Vec<String>) {
  for sep in SEPARATORS {
    if let Some((exercise, answers)) = text.split_once(sep) {
      return (vec![exercise.trim().to_string()], vec![answers.trim().to_string()]);
    }
  }
  (vec![text.trim().to_string()], vec![ANSWER_NOT_FOUND.to_string()])
}

// --- Line scan ---

enum ScanState {
  AccumulatingQuestion(String),
  AwaitingNext,
}

struct LineScanner {
  state: ScanState,
  questions: Vec<String>,
  answers: Vec<String>,
}

impl LineScanner {
  fn new() -> Self {
    Self {
      state: ScanState::AccumulatingQuestion(String::new()),
      questions: Vec::new(),
      answers: Vec::new(),
    }
  }

  fn feed(&mut self, raw: &str) {
    let line = raw.trim();
    if line.is_empty() {
      return;
    }

    if NUMBER_LINE_RE.is_match(line) {
      self.flush();
      self.state = ScanState::AccumulatingQuestion(String::new());
      return;
    }

    if let Some(answer) = answer_line_remainder(line) {
      if !answer.is_empty() {
        self.answers.push(answer.to_string());
      }
      return;
    }

    if let Some(caps) = NUMBERED_TEXT_LINE_RE.captures(line) {
      self.flush();
      self.state = ScanState::AccumulatingQuestion(caps[1].to_string());
      return;
    }

    if let ScanState::AccumulatingQuestion(buf) = &mut self.state {
      if !buf.is_empty() {
        buf.push('\n');
      }
      buf.push_str(line);
    } else {
      self.state = ScanState::AccumulatingQuestion(line.to_string());
    }
  }

  fn flush(&mut self) {
    if let ScanState::AccumulatingQuestion(buf) = std::mem::replace(&mut self.state, ScanState::AwaitingNext) {
      let q = buf.trim();
      if !q.is_empty() {
        self.questions.push(q.to_string());
      }
    }
  }

  fn finish(mut self) -> (Vec<String>, Vec<String>) {
    self.flush();
    (self.questions, self.answers)
  }
}

/// For lines opening with "Answer"/"Jawaban" (any case), the text after the first
/// colon, or after the keyword when there is no colon.
fn answer_line_remainder(line: &str) -> Option<&str> {
  let lower = line.to_lowercase();
  let keyword_len = ["jawaban", "answer"]
    .iter()
    .find(|k| lower.starts_with(*k))
    .map(|k| k.len())?;
  let rest = match line.split_once(':') {
    Some((_, after)) => after,
    None => line.get(keyword_len..).unwrap_or(""),
  };
  Some(rest.trim())
}

fn scan_lines(text: &str) -> (Vec<String>, Vec<String>) {
  let mut scanner = LineScanner::new();
  for line in text.lines() {
    scanner.feed(line);
  }
  scanner.finish()
}

// --- Pattern extraction ---

/// Raw text of every numbered item, in order of appearance.
fn numbered_units(text: &str) -> Vec<&str> {
  let markers: Vec<(usize, usize)> = ITEM_MARKER_RE
    .find_iter(text)
    .filter(|m| text[m.end()..].chars().next().map_or(true, char::is_whitespace))
    .map(|m| (m.start(), m.end()))
    .collect();

  markers
    .iter()
    .enumerate()
    .map(|(i, &(_, body_start))| {
      let body_end = markers.get(i + 1).map_or(text.len(), |&(next_start, _)| next_start);
      text[body_start..body_end].trim()
    })
    .collect()
}

/// Byte span of the answer marker in `unit`. `Jawaban:` wins wherever it is;
/// otherwise the first `Answer:` label.
fn answer_marker(unit: &str) -> Option<(usize, usize)> {
  if let Some(m) = JAWABAN_RE.find(unit) {
    return Some((m.start(), m.end()));
  }
  ANSWER_LABEL_RE
    .captures(unit)
    .and_then(|caps| caps.get(1))
    .map(|m| (m.start(), m.end()))
}

fn split_unit(unit: &str) -> Option<(String, String)> {
  let (question, answer) = match answer_marker(unit) {
    Some((start, end)) => (unit[..start].trim(), unit[end..].trim()),
    None => (unit, ""),
  };
  if question.is_empty() {
    return None;
  }
  let answer = if answer.is_empty() { ANSWER_NOT_AVAILABLE } else { answer };
  Some((question.to_string(), answer.to_string()))
}

/// Pairs for the block layout: every question first, then a header line with the
/// numbered answers directly under it. `None` when the text is not in that shape.
fn answer_section_pairs(text: &str) -> Option<(Vec<String>, Vec<String>)> {
  let header = ANSWER_SECTION_RE.find_iter(text).last()?;
  let (above, below) = (&text[..header.start()], &text[header.end()..]);
  if !LEADING_ITEM_RE.is_match(below) {
    return None;
  }

  let questions: Vec<&str> = numbered_units(above).into_iter().filter(|u| !u.is_empty()).collect();
  let answers: Vec<&str> = numbered_units(below).into_iter().filter(|u| !u.is_empty()).collect();
  if questions.is_empty() || answers.is_empty() {
    return None;
  }
  // A marker inside any item means answers sit next to their questions.
  if questions.iter().chain(&answers).any(|u| answer_marker(u).is_some()) {
    return None;
  }

  let answers = (0..questions.len())
    .map(|i| answers.get(i).map_or(ANSWER_NOT_AVAILABLE, |a| *a).to_string())
    .collect();
  Some((questions.into_iter().map(str::to_string).collect(), answers))
}

fn extract_numbered(text: &str) -> (Vec<String>, Vec<String>) {
  if let Some(pairs) = answer_section_pairs(text) {
    return pairs;
  }
  numbered_units(text).into_iter().filter_map(split_unit).unzip()
}
