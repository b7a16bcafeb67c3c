//! Console rendering.
//!
//! Every command result goes through [`Console::emit`], which prints either a
//! coloured block or one JSON document per line when `--json` is set.
use anyhow::Result;
use colored::Colorize;
use deepread_game::{
    Advance, Book, BookRef, BookSummary, DifficultyConfig, DifficultyId, GamePhase, GameState,
    LevelInfo, MENU_COMMANDS, ManaChange, MilestoneCard, PhaseProgress, Quest, QuestOutcome,
    SyntopicalQuest, UnlockCheck, ValidationResult, VerificationQuestion, VerificationReport,
    XpAward,
};
use serde::Serialize;
use std::io::{self, Write};

use crate::index::ExpandedPassage;

const GAUGE_WIDTH: usize = 10;

pub struct Console<W: Write> {
    out: W,
    json: bool,
}

impl<W: Write> Console<W> {
    pub const fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    /// Print `value` as JSON or through `draw`.
    pub fn emit<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
        draw: impl FnOnce(&mut W, &T) -> io::Result<()>,
    ) -> Result<()> {
        if self.json {
            serde_json::to_writer(&mut self.out, value)?;
            writeln!(self.out)?;
        } else {
            draw(&mut self.out, value)?;
        }
        Ok(())
    }

    /// Free-form line; suppressed in JSON mode.
    pub fn note(&mut self, line: impl std::fmt::Display) -> Result<()> {
        if !self.json {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

// ratio is clamped to [0, 1] so the cast stays within the gauge
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn filled(current: f64, max: f64) -> usize {
    if max <= 0.0 {
        return GAUGE_WIDTH;
    }
    let ratio = (current / max).clamp(0.0, 1.0);
    (ratio * GAUGE_WIDTH as f64).round() as usize
}

/// `XP: ███░░░░░░░ 120/200`
#[must_use]
pub fn xp_bar(xp: u32, next: u32) -> String {
    let cells = filled(f64::from(xp), f64::from(next));
    format!(
        "XP: {}{} {xp}/{next}",
        "█".repeat(cells),
        "░".repeat(GAUGE_WIDTH - cells)
    )
}

/// `Mana: ██████░░░░ 60%` with a mood marker for low mana.
#[must_use]
pub fn mana_gauge(mana: i32) -> String {
    let cells = filled(f64::from(mana), 100.0);
    let mood = if mana > 50 {
        "🔮"
    } else if mana > 20 {
        "⚠️"
    } else {
        "💀"
    };
    format!(
        "{mood} Mana: {}{} {mana}%",
        "█".repeat(cells),
        "░".repeat(GAUGE_WIDTH - cells)
    )
}

pub fn banner(w: &mut impl Write, title: &str) -> io::Result<()> {
    writeln!(w, "{}", format!("📚 {title}").bright_cyan().bold())?;
    writeln!(w, "{}", "=".repeat(title.chars().count() + 3).cyan())
}

pub fn books(w: &mut impl Write, books: &[Book]) -> io::Result<()> {
    if books.is_empty() {
        return writeln!(w, "No books imported yet. Try `deepread import <file.md>`.");
    }
    banner(w, "Library")?;
    for book in books {
        let author = if book.author.is_empty() {
            String::new()
        } else {
            format!(" by {}", book.author)
        };
        writeln!(
            w,
            "{}  {}{} ({} chapters)",
            book.id.dimmed(),
            book.title.bold(),
            author,
            book.chapter_count
        )?;
    }
    Ok(())
}

pub fn difficulties(w: &mut impl Write, configs: &[&DifficultyConfig]) -> io::Result<()> {
    banner(w, "Difficulties")?;
    writeln!(
        w,
        "{:<11} {:>5} {:>5} {:>6} {:>6} {:>6} {:>6}  advanced",
        "id", "xp", "rest", "hints", "terms", "props", "args"
    )?;
    for cfg in configs {
        writeln!(
            w,
            "{:<11} {:>5.2} {:>5} {:>6} {:>6} {:>6} {:>6}  {}",
            cfg.id.as_str(),
            cfg.xp_multiplier,
            cfg.mana_recovery,
            if cfg.hints_available { "yes" } else { "no" },
            cfg.thresholds.terms,
            cfg.thresholds.propositions,
            cfg.thresholds.arguments,
            cfg.advanced_mode
                .filter(|a| a.enabled)
                .map_or_else(|| "-".to_string(), |a| format!("groups of {}", a.min_group_size))
        )?;
    }
    Ok(())
}

/// Everything `deepread status` shows for one book.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub book: BookRef,
    pub difficulty: DifficultyId,
    pub level: LevelInfo,
    pub tools: &'static [&'static str],
    pub needs_rest: bool,
    pub state: GameState,
    pub progress: PhaseProgress,
    pub chapter_count: u32,
    pub terms: usize,
    pub propositions: usize,
    pub arguments: usize,
    pub understanding_verified: bool,
}

pub fn status(w: &mut impl Write, view: &StatusView) -> io::Result<()> {
    let state = &view.state;
    banner(w, &view.book.title)?;
    let level = &view.level;
    writeln!(
        w,
        "👤 Level {} {}  |  {} ({}%)  |  {}",
        level.level,
        level.title.bold(),
        xp_bar(state.xp_total, level.xp_for_next.unwrap_or(state.xp_total)),
        level.progress,
        mana_gauge(state.mana)
    )?;
    if view.needs_rest {
        writeln!(
            w,
            "{}",
            "😴 Mana is running low. Run `deepread rest` to recover.".yellow()
        )?;
    }
    writeln!(
        w,
        "📍 {} ({})  chapter {}/{}  difficulty {}",
        state.current_phase.label().bold(),
        state.current_phase,
        state.current_chapter,
        view.chapter_count,
        view.difficulty
    )?;
    if state.combo_count > 0 {
        writeln!(w, "🔥 Combo x{}", state.combo_count)?;
    }
    if !view.tools.is_empty() {
        writeln!(w, "🧰 Tools: {}", view.tools.join(", "))?;
    }
    writeln!(
        w,
        "🎒 {} term(s), {} proposition(s), {} argument(s){}",
        view.terms,
        view.propositions,
        view.arguments,
        if view.understanding_verified {
            ", understanding verified"
        } else {
            ""
        }
    )?;
    progress(w, &view.progress)
}

pub fn progress(w: &mut impl Write, progress: &PhaseProgress) -> io::Result<()> {
    if progress.ready {
        return writeln!(w, "{}", "✅ Ready to advance: run `deepread advance`".green());
    }
    writeln!(w, "Still needed:")?;
    for item in &progress.missing {
        writeln!(w, "  • {}", item.yellow())?;
    }
    Ok(())
}

pub fn quest(w: &mut impl Write, quest: &Quest) -> io::Result<()> {
    writeln!(w, "╭──────────────────────────────────────╮")?;
    writeln!(
        w,
        "│ ⚔️  {} {}",
        format!("QUEST: {}", quest.kind).bold(),
        format!("[{}]", quest.tier.as_str()).dimmed()
    )?;
    writeln!(w, "│")?;
    for line in quest.description.lines() {
        writeln!(w, "│ {line}")?;
    }
    writeln!(w, "│")?;
    writeln!(w, "│ 🎯 {}", quest.target)?;
    writeln!(w, "│ 🏆 Reward: +{} XP", quest.xp_reward)?;
    writeln!(w, "╰──────────────────────────────────────╯")
}

pub fn syntopical_quest(w: &mut impl Write, quest: &SyntopicalQuest) -> io::Result<()> {
    self::quest(w, &quest.quest)?;
    writeln!(w, "Topic: {}", quest.topic.bold())?;
    for book in &quest.books {
        writeln!(w, "  📖 {} {}", book.title, book.id.dimmed())?;
    }
    Ok(())
}

pub fn validation(w: &mut impl Write, result: &ValidationResult) -> io::Result<()> {
    let verdict = if result.valid {
        format!("✅ Accepted ({}%)", result.score).green()
    } else {
        format!("❌ Rejected ({}%)", result.score).red()
    };
    writeln!(w, "{verdict}")?;
    writeln!(w, "{}", result.feedback.italic())?;
    if !result.matched_concepts.is_empty() {
        writeln!(w, "Matched: {}", result.matched_concepts.join(", "))?;
    }
    if !result.missed_concepts.is_empty() {
        writeln!(w, "Missed: {}", result.missed_concepts.join(", "))?;
    }
    for hint in &result.hints {
        writeln!(w, "  💡 {hint}")?;
    }
    Ok(())
}

pub fn award(w: &mut impl Write, award: &XpAward) -> io::Result<()> {
    writeln!(w, "{}", award.message.bright_green().bold())?;
    if let Some(level_up) = &award.level_up {
        writeln!(
            w,
            "{}",
            format!(
                "🎉 LEVEL UP! {} → {}: {} (mana restored)",
                level_up.old_level, level_up.new_level, level_up.new_title
            )
            .bright_yellow()
            .bold()
        )?;
    }
    Ok(())
}

pub fn mana(w: &mut impl Write, change: &ManaChange) -> io::Result<()> {
    let line = if change.mana_change < 0 {
        change.message.red()
    } else {
        change.message.blue()
    };
    writeln!(w, "{line}  {}", mana_gauge(change.state.mana))?;
    if change.exhausted {
        writeln!(
            w,
            "{}",
            "💤 Mana exhausted. Rest with `deepread rest` before continuing.".yellow()
        )?;
    }
    Ok(())
}

pub fn outcome(w: &mut impl Write, outcome: &QuestOutcome) -> io::Result<()> {
    match outcome {
        QuestOutcome::Completed(xp) => {
            writeln!(w, "{}", "✅ QUEST COMPLETE!".green().bold())?;
            award(w, xp)
        }
        QuestOutcome::Partial(change) => {
            writeln!(w, "{}", "🟡 Close, but not quite.".yellow())?;
            mana(w, change)
        }
        QuestOutcome::Failed(change) => {
            writeln!(w, "{}", "❌ QUEST FAILED".red().bold())?;
            mana(w, change)
        }
    }
}

pub fn advance(w: &mut impl Write, advance: &Advance) -> io::Result<()> {
    match advance {
        Advance::Moved { from, to } => writeln!(
            w,
            "{}",
            format!("🚪 {} → {}", from.label(), to.label())
                .bright_cyan()
                .bold()
        ),
        Advance::Blocked(p) => progress(w, p),
        Advance::FinalPhase => writeln!(
            w,
            "🏁 {} is the last phase on this track.",
            GamePhase::Judgment.label()
        ),
    }
}

pub fn milestone(w: &mut impl Write, card: &MilestoneCard) -> io::Result<()> {
    writeln!(w, "{}", format!("🏅 {}", card.title).bright_yellow().bold())?;
    writeln!(w, "   {}", card.headline)
}

pub fn verification_questions(
    w: &mut impl Write,
    questions: &[VerificationQuestion],
) -> io::Result<()> {
    if questions.is_empty() {
        return writeln!(w, "No passages are long enough to quiz on yet.");
    }
    banner(w, "Understanding check")?;
    for (idx, question) in questions.iter().enumerate() {
        writeln!(w, "{}. {}", idx + 1, question.question)?;
    }
    writeln!(
        w,
        "{}",
        "Answer with `deepread verify <book> --answer <word> ...` in order.".dimmed()
    )
}

pub fn verification_report(w: &mut impl Write, report: &VerificationReport) -> io::Result<()> {
    let line = format!(
        "{} {:.0}% (need {:.0}%)",
        if report.passed { "✅" } else { "❌" },
        report.score,
        report.threshold
    );
    writeln!(
        w,
        "{}",
        if report.passed { line.green() } else { line.red() }
    )?;
    writeln!(w, "{}", report.feedback.italic())?;
    for hint in &report.hints {
        writeln!(w, "  💡 {hint}")?;
    }
    Ok(())
}

pub fn unlock(w: &mut impl Write, check: &UnlockCheck) -> io::Result<()> {
    if check.can_unlock {
        writeln!(w, "{}", format!("🔓 {}", check.reason).green())?;
        for topic in &check.eligible_topics {
            writeln!(w, "  • {topic}")?;
        }
        Ok(())
    } else {
        writeln!(w, "{}", format!("🔒 {}", check.reason).yellow())
    }
}

pub fn debug_menu(w: &mut impl Write) -> io::Result<()> {
    banner(w, "Debug console")?;
    for (command, description) in MENU_COMMANDS {
        writeln!(w, "  {:<22} {description}", command.bold())?;
    }
    Ok(())
}

pub fn summary(w: &mut impl Write, summary: &BookSummary) -> io::Result<()> {
    banner(w, &format!("{} summary", summary.book.title))?;
    writeln!(
        w,
        "Level {} {} with {} XP on {}",
        summary.level,
        summary.level_title.bold(),
        summary.xp_total,
        summary.difficulty
    )?;
    writeln!(
        w,
        "Reached {}{}",
        summary.final_phase.label(),
        if summary.completed {
            " (analytical reading complete)"
        } else {
            ""
        }
    )?;
    let totals = &summary.totals;
    writeln!(
        w,
        "{} terms, {} propositions, {} arguments, {} critiques; {} quest(s) completed",
        totals.terms, totals.propositions, totals.arguments, totals.critiques, totals.quests_completed
    )?;
    if summary.visions > 0 {
        writeln!(w, "✨ {} vision fragment(s)", summary.visions)?;
    }
    for card in &summary.milestones {
        milestone(w, card)?;
    }
    Ok(())
}

pub fn passages(w: &mut impl Write, hits: &[ExpandedPassage]) -> io::Result<()> {
    if hits.is_empty() {
        return writeln!(w, "No matching passages.");
    }
    for (idx, hit) in hits.iter().enumerate() {
        writeln!(
            w,
            "{} {}",
            format!("💠 Shard #{} ({:.2})", idx + 1, hit.passage.score).bold(),
            format!("{}:{}", hit.chapter_file.display(), hit.line).dimmed()
        )?;
        for line in hit.passage.text.trim().lines() {
            writeln!(w, "> {line}")?;
        }
        writeln!(w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use deepread_game::{QuestKind, QuestStatus, QuestTier};

    fn render(draw: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        colored::control::set_override(false);
        let mut out = Vec::new();
        draw(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn gauges_scale_to_ten_cells() {
        assert_eq!(xp_bar(100, 200), "XP: █████░░░░░ 100/200");
        assert_eq!(xp_bar(0, 0), "XP: ██████████ 0/0");
        assert_eq!(mana_gauge(100), "🔮 Mana: ██████████ 100%");
        assert!(mana_gauge(30).starts_with("⚠️"));
        assert!(mana_gauge(0).starts_with("💀"));
    }

    #[test]
    fn status_shows_tools_progress_and_rest_advice() {
        let state = GameState {
            xp_total: 350,
            mana: 10,
            ..GameState::default()
        };
        let view = StatusView {
            book: BookRef {
                id: "b1".into(),
                title: "How to Read a Book".into(),
            },
            difficulty: DifficultyId::Master,
            level: state.level_info(),
            tools: GamePhase::Scouting.available_tools(),
            needs_rest: state.needs_rest(),
            state,
            progress: PhaseProgress {
                ready: false,
                missing: vec!["Classify Book".into()],
            },
            chapter_count: 3,
            terms: 0,
            propositions: 0,
            arguments: 0,
            understanding_verified: false,
        };
        let text = render(|w| status(w, &view));
        assert!(text.contains("Apprentice"));
        assert!(text.contains("350/500 (50%)"));
        assert!(text.contains("deepread rest"));
        assert!(text.contains("Tools: scan_structure, classify_book"));
    }

    #[test]
    fn quest_card_lists_reward() {
        let quest = Quest {
            id: "quest_1".into(),
            kind: QuestKind::Hunt,
            description: "Find a key term".into(),
            target: "Term Definition".into(),
            xp_reward: 40,
            tier: QuestTier::Normal,
            status: QuestStatus::Active,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        let text = render(|w| self::quest(w, &quest));
        assert!(text.contains("Find a key term"));
        assert!(text.contains("Reward: +40 XP"));
    }

    #[test]
    fn json_mode_writes_one_document_per_emit() {
        let mut console = Console::new(Vec::new(), true);
        console.emit(&vec![1, 2], |_, _| Ok(())).unwrap();
        console.note("hidden").unwrap();
        console.emit("done", |_, _| Ok(())).unwrap();
        let text = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(text, "[1,2]\n\"done\"\n");
    }

    #[test]
    fn blocked_advance_lists_missing_items() {
        let blocked = Advance::Blocked(PhaseProgress {
            ready: false,
            missing: vec!["Classify Book".into()],
        });
        let text = render(|w| advance(w, &blocked));
        assert!(text.contains("Still needed"));
        assert!(text.contains("• Classify Book"));
    }
}
