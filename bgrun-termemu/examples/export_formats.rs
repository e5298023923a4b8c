//! Feed a terminal some formatted output and print every export format.

use bgrun_termemu::{ExportFormat, ExportOptions, Terminal};

fn main() {
    let term = Terminal::new(10, 80);

    term.feed(b"Terminal Export Formats\r\n");
    term.feed(b"=======================\r\n\r\n");

    term.feed(b"Visit ");
    term.feed(b"\x1b]8;;https://example.com/bgrun\x1b\\the project page\x1b]8;;\x1b\\");
    term.feed(b" for more\r\n\r\n");

    term.feed(b"Styles: \x1b[1mbold\x1b[0m \x1b[3mitalic\x1b[0m \x1b[31mred\x1b[0m\r\n");
    term.feed(b"Special characters: *stars* _underscores_ <tags> & \"quotes\"\r\n");

    for (name, format) in [
        ("Plain text", ExportFormat::Text),
        ("Markdown", ExportFormat::Markdown),
        ("HTML", ExportFormat::Html),
    ] {
        println!("=== {} ===", name);
        println!("{}", term.export(&ExportOptions::new(format)));
    }
}
