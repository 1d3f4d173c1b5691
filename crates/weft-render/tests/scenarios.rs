//! End-to-end reconciliation scenarios against a captured byte stream.

use weft_core::capabilities::Capabilities;
use weft_render::cell::{CellAttr, Color};
use weft_render::{DisplayBuffer, Presenter};

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn position(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[test]
fn hello_world_frame() {
    let mut buf = DisplayBuffer::new(80, 24);
    let mut presenter = Presenter::new(Vec::new(), Capabilities::modern());

    let attr = CellAttr::DEFAULT.with_fg(Color::Rgb(255, 128, 0));
    buf.put_text(0, 0, "Hello", attr);
    presenter.present(&mut buf, None).unwrap();

    let out = presenter.into_writer().unwrap();
    assert!(out.starts_with(b"\x1b[0m"));

    let color = position(&out, b"\x1b[38;2;255;128;0m").expect("rgb color");
    let cup = position(&out, b"\x1b[1;1H").expect("home position");
    let text = position(&out, b"Hello").expect("payload");
    assert!(color < cup && cup < text, "reset, color, move, text order");
}

#[test]
fn single_cell_update_after_hello() {
    let mut buf = DisplayBuffer::new(80, 24);
    let mut presenter = Presenter::new(Vec::new(), Capabilities::modern());
    let attr = CellAttr::DEFAULT.with_fg(Color::Rgb(255, 128, 0));

    buf.put_text(0, 0, "Hello", attr);
    presenter.present(&mut buf, None).unwrap();

    buf.put_char(4, 0, "!", attr);
    let snapshot = buf.damage_snapshot();
    assert_eq!((snapshot[0].start(), snapshot[0].end()), (4, 5));
    assert!(snapshot[1..].iter().all(|d| d.is_empty()));

    // Re-damage and flush for real.
    buf.put_char(4, 0, "!", attr);
    let stats = presenter.present(&mut buf, None).unwrap();
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.cells, 1);

    let out = presenter.into_writer().unwrap();
    assert!(out.ends_with(b"!"));
}

#[test]
fn wide_char_overwrite() {
    let mut buf = DisplayBuffer::new(80, 24);
    let attr = CellAttr::DEFAULT;

    buf.put_text(0, 0, "漢", attr);
    assert_eq!(buf.back_cell(0, 0).unwrap().width, 2);
    assert!(buf.back_cell(1, 0).unwrap().is_trailing());

    buf.put_char(1, 0, "x", attr);
    assert!(buf.back_cell(0, 0).unwrap().is_blank(), "leader blanked");
    assert_eq!(buf.back_cell(1, 0).unwrap().cluster.as_str(), "x");

    let snapshot = buf.damage_snapshot();
    assert!(snapshot[0].start() == 0 && snapshot[0].end() >= 2);
}

#[test]
fn consecutive_flushes_are_quiet() {
    let mut buf = DisplayBuffer::new(40, 10);
    let mut presenter = Presenter::new(Vec::new(), Capabilities::xterm_256color());

    buf.put_text(2, 3, "steady", CellAttr::DEFAULT.with_fg(Color::Indexed(45)));
    let first = presenter.present(&mut buf, None).unwrap();
    assert!(first.bytes > 0);

    for _ in 0..3 {
        let again = presenter.present(&mut buf, None).unwrap();
        assert_eq!(again.bytes, 0);
    }
}

#[test]
fn resize_then_redraw_covers_new_area() {
    let mut buf = DisplayBuffer::new(10, 3);
    let mut presenter = Presenter::new(Vec::new(), Capabilities::modern());

    buf.put_text(0, 0, "corner", CellAttr::DEFAULT);
    presenter.present(&mut buf, None).unwrap();

    buf.resize(20, 6);
    let stats = presenter.present(&mut buf, None).unwrap();
    // Growth damages everything; content is re-emitted.
    assert!(stats.cells >= 6);

    let out = presenter.into_writer().unwrap();
    assert!(contains(&out, b"corner"));
}

#[test]
fn mono_capability_suppresses_color() {
    let mut buf = DisplayBuffer::new(10, 2);
    let mut presenter = Presenter::new(Vec::new(), Capabilities::dumb());

    buf.put_text(0, 0, "plain", CellAttr::DEFAULT.with_fg(Color::Rgb(9, 9, 9)));
    presenter.present(&mut buf, None).unwrap();

    let out = presenter.into_writer().unwrap();
    assert!(contains(&out, b"plain"));
    assert!(!contains(&out, b"\x1b[38;2"));
    assert!(!contains(&out, b"\x1b[38;5"));
}
