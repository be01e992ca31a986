//! Exporter output for whole transcripts and single exchanges.

use chrono::{Local, TimeZone};
use philo_client::export::{export_exchange, export_transcript};
use philo_client::{
    ExportFormat, ExportLabels, Message, MessageStatus, SessionError, Transcript,
};

fn generated_at() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2026, 10, 16, 15, 4, 0).unwrap()
}

fn answered(t: &mut Transcript, question: &str, answer: &str, sources: Option<&str>) {
    t.append(Message::user(question));
    let h = t.append(Message::assistant_placeholder());
    t.update_content(h, answer).unwrap();
    if let Some(s) = sources {
        t.set_sources(h, s).unwrap();
    }
    t.finalize(h, MessageStatus::Complete).unwrap();
}

fn rule_lines(body: &str, c: char) -> usize {
    body.lines()
        .filter(|l| l.len() == 80 && l.chars().all(|x| x == c))
        .count()
}

#[test]
fn plain_transcript_has_numbered_blocks_and_rules() {
    let mut t = Transcript::new();
    answered(&mut t, "What is knowledge?", "Knowledge is...", Some("Epistemology 101"));
    answered(&mut t, "And belief?", "Belief is weaker.", None);

    let doc = export_transcript(
        t.snapshot(),
        ExportFormat::Plain,
        &ExportLabels::default(),
        generated_at(),
    )
    .unwrap();

    let blocks: Vec<&str> = doc
        .body
        .lines()
        .filter(|l| l.starts_with("EXCHANGE "))
        .collect();
    assert_eq!(blocks, ["EXCHANGE 1", "EXCHANGE 2"]);

    // One header rule, then one trailing rule per exchange.
    let after_first_block = &doc.body[doc.body.find("EXCHANGE 1").unwrap()..];
    assert_eq!(rule_lines(after_first_block, '='), 2);
    assert_eq!(rule_lines(&doc.body, '='), 3);
    assert_eq!(rule_lines(&doc.body, '-'), 2);

    assert!(doc.body.starts_with("COMPLETE CONVERSATION WITH KUCZYNSKI\nDate: October 16, 2026, 03:04 PM\n"));
    assert!(doc.body.contains("Total Exchanges: 2\n"));
    assert!(doc.body.contains("KUCZYNSKI:\nKnowledge is...\n\nSources: Epistemology 101\n"));
    assert_eq!(doc.body.matches("Sources:").count(), 1);
    assert!(doc
        .body
        .ends_with("\nGenerated by Ask a Philosopher - J.-M. Kuczynski AI Assistant\n"));
    assert_eq!(doc.mime_type(), "text/plain");
    assert!(doc.filename.starts_with("kuczynski-full-conversation-"));
    assert!(doc.filename.ends_with(".txt"));
}

#[test]
fn markdown_transcript_layout() {
    let mut t = Transcript::new();
    answered(&mut t, "What is knowledge?", "Knowledge is...", Some("Epistemology 101"));

    let doc = export_transcript(
        t.snapshot(),
        ExportFormat::Markdown,
        &ExportLabels::default(),
        generated_at(),
    )
    .unwrap();

    let expected = "# Complete Conversation with Kuczynski\n\
        Date: October 16, 2026, 03:04 PM\n\n\
        Total Exchanges: 1\n\n\
        ---\n\n\
        ## Exchange 1\n\n\
        **USER:**\nWhat is knowledge?\n\n\
        **KUCZYNSKI:**\nKnowledge is...\n\n\
        **Sources: Epistemology 101**\n\n\
        ---\n\n\
        \n*Generated by Ask a Philosopher - J.-M. Kuczynski AI Assistant*\n";
    assert_eq!(doc.body, expected);
    assert_eq!(doc.mime_type(), "text/markdown");
}

#[test]
fn single_exchange_markdown_without_sources_has_no_stray_markers() {
    let mut t = Transcript::new();
    answered(&mut t, "Is time real?", "It is.", None);
    let exchange = t.exchanges()[0];

    let doc = export_exchange(
        &exchange,
        ExportFormat::Markdown,
        &ExportLabels::default(),
        generated_at(),
    )
    .unwrap();

    let expected = "# Conversation with Kuczynski\n\
        Date: October 16, 2026\n\n\
        ## Exchange\n\n\
        **User:** Is time real?\n\n\
        **Kuczynski:** It is.\n\n\
        ---\n\n\
        *Generated by Ask a Philosopher - J.-M. Kuczynski AI Assistant*\n";
    assert_eq!(doc.body, expected);
    assert!(!doc.body.contains("****"));
    assert!(doc.filename.starts_with("kuczynski-conversation-"));
}

#[test]
fn single_exchange_plain_has_no_numbering() {
    let mut t = Transcript::new();
    answered(&mut t, "Q", "A", Some("X-1, X-2"));
    let labels = ExportLabels {
        assistant_name: "Hume".into(),
        app_name: "Skeptic".into(),
    };

    let doc = export_exchange(&t.exchanges()[0], ExportFormat::Plain, &labels, generated_at())
        .unwrap();

    assert!(doc.body.starts_with("CONVERSATION WITH HUME\nDate: October 16, 2026\n"));
    assert!(!doc.body.contains("EXCHANGE"));
    assert!(doc.body.contains("HUME:\nA\n"));
    assert!(doc.body.contains("Sources: X-1, X-2\n"));
    assert!(doc.body.ends_with("Generated by Skeptic\n"));
}

#[test]
fn empty_transcript_is_an_explicit_failure() {
    let t = Transcript::new();
    for format in [ExportFormat::Markdown, ExportFormat::Plain] {
        let result = export_transcript(t.snapshot(), format, &ExportLabels::default(), generated_at());
        assert!(matches!(result, Err(SessionError::EmptyExport)));
    }
}

#[test]
fn streaming_exchange_is_left_out() {
    let mut t = Transcript::new();
    answered(&mut t, "one", "first", None);
    t.append(Message::user("two"));
    let open = t.append(Message::assistant_placeholder());
    t.update_content(open, "still typing").unwrap();

    let doc = export_transcript(
        t.snapshot(),
        ExportFormat::Plain,
        &ExportLabels::default(),
        generated_at(),
    )
    .unwrap();
    assert!(doc.body.contains("Total Exchanges: 1\n"));
    assert!(!doc.body.contains("still typing"));

    let pending = t.exchange(open).unwrap();
    assert!(matches!(
        export_exchange(&pending, ExportFormat::Plain, &ExportLabels::default(), generated_at()),
        Err(SessionError::EmptyExport)
    ));
}

#[test]
fn only_completed_exchange_exports_alone() {
    let mut t = Transcript::new();
    answered(&mut t, "one", "first", None);
    t.append(Message::user("two"));
    let failed = t.append(Message::assistant_placeholder());
    t.update_content(failed, "Error: transport unavailable").unwrap();
    t.finalize(failed, MessageStatus::Failed).unwrap();
    t.append(Message::user("three"));
    let cut = t.append(Message::assistant_placeholder());
    t.update_content(cut, "half an ans").unwrap();
    t.finalize(cut, MessageStatus::Incomplete).unwrap();

    for handle in [failed, cut] {
        let exchange = t.exchange(handle).unwrap();
        assert!(matches!(
            export_exchange(&exchange, ExportFormat::Markdown, &ExportLabels::default(), generated_at()),
            Err(SessionError::EmptyExport)
        ));
    }

    let doc = export_transcript(
        t.snapshot(),
        ExportFormat::Markdown,
        &ExportLabels::default(),
        generated_at(),
    )
    .unwrap();
    assert!(doc.body.contains("Total Exchanges: 3\n"));
    assert!(doc.body.contains("**KUCZYNSKI:**\nError: transport unavailable\n"));
    assert!(doc.body.contains("## Exchange 3\n"));
}

#[test]
fn export_is_deterministic() {
    let mut t = Transcript::new();
    answered(&mut t, "q", "a", Some("s"));
    let render = || {
        export_transcript(
            t.snapshot(),
            ExportFormat::Markdown,
            &ExportLabels::default(),
            generated_at(),
        )
        .unwrap()
    };
    assert_eq!(render(), render());
}

#[test]
fn format_names_parse() {
    assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
    assert_eq!("1".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
    assert_eq!("TXT".parse::<ExportFormat>().unwrap(), ExportFormat::Plain);
    assert_eq!("2".parse::<ExportFormat>().unwrap(), ExportFormat::Plain);
    assert!("pdf".parse::<ExportFormat>().is_err());
}
