use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::executor::{Bindings, LiveStack};
use crate::parser::SourceUnit;

/// Variable name to rendered value, in binding order.
pub type DisplayMap = IndexMap<String, String>;

/// Source lines around a frame's current line. Empty when the text could not
/// be located.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceExcerpt {
    pub start_line: usize,
    pub current_line: usize,
    pub lines: Vec<String>,
}

/// One captured stack level. Values are rendered strings, so a frame stays
/// valid after the live level is mutated or popped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub unit: String,
    pub line: usize,
    pub function: String,
    pub locals: DisplayMap,
    pub globals: DisplayMap,
    pub source: SourceExcerpt,
}

/// Flattened variable view of the innermost frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variables {
    pub locals: DisplayMap,
    pub globals: DisplayMap,
}

impl Variables {
    pub fn of(frame: &Frame) -> Self {
        Self {
            locals: frame.locals.clone(),
            globals: frame.globals.clone(),
        }
    }
}

pub struct FrameBuilder<'u> {
    unit: &'u SourceUnit,
    context_lines: usize,
}

impl<'u> FrameBuilder<'u> {
    pub fn new(unit: &'u SourceUnit, context_lines: usize) -> Self {
        Self {
            unit,
            context_lines,
        }
    }

    /// Frames from innermost to outermost.
    pub fn build_stack(&self, stack: &LiveStack<'_>) -> Vec<Frame> {
        stack
            .levels()
            .map(|level| Frame {
                unit: self.unit.name().to_string(),
                line: level.line,
                function: level.function.to_string(),
                locals: render(level.locals),
                globals: render(level.globals),
                source: self.excerpt(level.line),
            })
            .collect()
    }

    fn excerpt(&self, line: usize) -> SourceExcerpt {
        match self.unit.window(line, self.context_lines) {
            Some((start_line, lines)) => SourceExcerpt {
                start_line,
                current_line: line,
                lines: lines.to_vec(),
            },
            None => SourceExcerpt::default(),
        }
    }
}

pub fn render(bindings: &Bindings) -> DisplayMap {
    bindings
        .iter()
        .map(|(name, value)| (name.clone(), value.repr()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Directive, Interpreter, OutputBuffer, TraceEvent, Tracer};
    use crate::parser::parse_program;

    const SOURCE: &str = "total = 0\ndef add(n)\n  local = n + 1\n  return local\nend\ntotal = add(2)\n";

    struct Capture<'u> {
        builder: FrameBuilder<'u>,
        at_line: usize,
        frames: Vec<Frame>,
    }

    impl Tracer for Capture<'_> {
        fn on_event(&mut self, event: TraceEvent<'_>, stack: &LiveStack<'_>) -> Directive {
            if matches!(event, TraceEvent::Line) && stack.line() == self.at_line {
                self.frames = self.builder.build_stack(stack);
            }
            Directive::Proceed
        }
    }

    fn frames_at(line: usize, context: usize) -> Vec<Frame> {
        let unit = SourceUnit::new("<script>", SOURCE);
        let program = parse_program(SOURCE).unwrap();
        let mut capture = Capture {
            builder: FrameBuilder::new(&unit, context),
            at_line: line,
            frames: Vec::new(),
        };
        let output = OutputBuffer::new();
        Interpreter::new(&mut capture, &output, 10).run(&program);
        capture.frames
    }

    #[test]
    fn frames_run_innermost_first_and_outlive_the_stack() {
        let frames = frames_at(4, 1);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].function, "add");
        assert_eq!(frames[0].line, 4);
        assert_eq!(frames[0].locals["n"], "2");
        assert_eq!(frames[0].locals["local"], "3");
        assert_eq!(frames[1].function, "<module>");
        assert_eq!(frames[1].line, 6);
        assert_eq!(frames[1].locals["total"], "0");
        assert_eq!(frames[0].source.start_line, 3);
        assert_eq!(frames[0].source.lines, ["  local = n + 1", "  return local", "end"]);
    }

    #[test]
    fn module_level_locals_mirror_globals() {
        let frames = frames_at(6, 3);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].locals, frames[0].globals);
        assert_eq!(frames[0].globals["add"], "<function add>");
        assert_eq!(frames[0].source.start_line, 3);
        assert_eq!(frames[0].source.lines.len(), 4);
    }

    #[test]
    fn missing_source_gives_an_empty_excerpt() {
        let unit = SourceUnit::new("<script>", "x = 1");
        let builder = FrameBuilder::new(&unit, 3);
        assert_eq!(builder.excerpt(40), SourceExcerpt::default());
    }
}
