use colored::{Color, Colorize};
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

#[derive(Debug, Clone, Copy, Default)]
struct Style {
    color: Option<Color>,
    bold: bool,
    italic: bool,
    strikethrough: bool,
    underline: bool,
}

impl Style {
    fn fg(color: Color) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    fn paint(self, text: &str) -> String {
        let mut painted = text.normal();
        if let Some(color) = self.color {
            painted = painted.color(color);
        }
        if self.bold {
            painted = painted.bold();
        }
        if self.italic {
            painted = painted.italic();
        }
        if self.strikethrough {
            painted = painted.strikethrough();
        }
        if self.underline {
            painted = painted.underline();
        }
        painted.to_string()
    }
}

/// Render markdown as ANSI-styled text for the terminal
pub fn render_markdown(input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let parser = Parser::new_ext(input, options);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut style_stack = vec![Style::default()];
    let mut in_code_block = false;
    let mut code_block_content = String::new();
    let mut list_depth: usize = 0;

    fn flush(lines: &mut Vec<String>, current: &mut String) {
        if !current.is_empty() {
            lines.push(std::mem::take(current));
        }
    }

    fn separate(lines: &mut Vec<String>, list_depth: usize) {
        if list_depth == 0 && lines.last().is_some_and(|l| !l.is_empty()) {
            lines.push(String::new());
        }
    }

    for event in parser {
        let top = style_stack.last().copied().unwrap_or_default();
        match event {
            Event::Start(tag) => {
                let new_style = match tag {
                    Tag::Heading { level, .. } => {
                        flush(&mut lines, &mut current);
                        let (prefix, color) = match level {
                            HeadingLevel::H1 => ("# ", Color::Cyan),
                            HeadingLevel::H2 => ("## ", Color::Blue),
                            HeadingLevel::H3 => ("### ", Color::Green),
                            _ => ("#### ", Color::Yellow),
                        };
                        let style = Style {
                            bold: true,
                            ..Style::fg(color)
                        };
                        current.push_str(&style.paint(prefix));
                        style
                    }
                    Tag::Emphasis => Style { italic: true, ..top },
                    Tag::Strong => Style { bold: true, ..top },
                    Tag::Strikethrough => Style {
                        strikethrough: true,
                        ..top
                    },
                    Tag::CodeBlock(kind) => {
                        in_code_block = true;
                        code_block_content.clear();
                        flush(&mut lines, &mut current);
                        let lang = match kind {
                            CodeBlockKind::Fenced(lang) => lang.to_string(),
                            CodeBlockKind::Indented => String::new(),
                        };
                        lines.push(format!(
                            "{}{}",
                            Style::fg(Color::BrightBlack).paint("```"),
                            Style::fg(Color::Magenta).paint(&lang)
                        ));
                        Style::fg(Color::White)
                    }
                    Tag::List(_) => {
                        list_depth += 1;
                        flush(&mut lines, &mut current);
                        top
                    }
                    Tag::Item => {
                        flush(&mut lines, &mut current);
                        current.push_str(&"  ".repeat(list_depth.saturating_sub(1)));
                        current.push_str(&Style::fg(Color::Yellow).paint("• "));
                        top
                    }
                    Tag::Link { .. } => {
                        current.push_str(&Style::fg(Color::Blue).paint("["));
                        Style {
                            underline: true,
                            ..Style::fg(Color::Blue)
                        }
                    }
                    Tag::BlockQuote(_) => {
                        flush(&mut lines, &mut current);
                        current.push_str(&Style::fg(Color::BrightBlack).paint("│ "));
                        Style {
                            italic: true,
                            ..Style::fg(Color::White)
                        }
                    }
                    _ => top,
                };
                style_stack.push(new_style);
            }
            Event::End(tag) => {
                style_stack.pop();
                match tag {
                    TagEnd::Heading(_) | TagEnd::Paragraph => {
                        flush(&mut lines, &mut current);
                        separate(&mut lines, list_depth);
                    }
                    TagEnd::Item => flush(&mut lines, &mut current),
                    TagEnd::CodeBlock => {
                        in_code_block = false;
                        for line in code_block_content.lines() {
                            lines.push(Style::fg(Color::White).paint(line));
                        }
                        lines.push(Style::fg(Color::BrightBlack).paint("```"));
                        code_block_content.clear();
                        separate(&mut lines, list_depth);
                    }
                    TagEnd::List(_) => {
                        flush(&mut lines, &mut current);
                        list_depth = list_depth.saturating_sub(1);
                        separate(&mut lines, list_depth);
                    }
                    TagEnd::Link => {
                        current.push_str(&Style::fg(Color::Blue).paint("]"));
                    }
                    TagEnd::BlockQuote(_) => flush(&mut lines, &mut current),
                    _ => {}
                }
            }
            Event::Text(text) => {
                if in_code_block {
                    code_block_content.push_str(&text);
                } else {
                    current.push_str(&top.paint(&text));
                }
            }
            Event::Code(code) => {
                current.push_str(&Style::fg(Color::Yellow).paint(&format!("`{}`", code)));
            }
            Event::SoftBreak | Event::HardBreak => flush(&mut lines, &mut current),
            Event::Rule => {
                flush(&mut lines, &mut current);
                lines.push(Style::fg(Color::BrightBlack).paint(&"─".repeat(40)));
            }
            _ => {}
        }
    }

    flush(&mut lines, &mut current);
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}
