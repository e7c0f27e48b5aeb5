use std::fmt::Write;

use jiff::{Zoned, tz::TimeZone};
use log::Record;
use logforth::{
    append::Stdout,
    layout::{JsonLayout, Layout},
};

use crate::args::{Args, LogStyle};

/// `<UTC timestamp> <level>  <message>`, with the level optionally colored.
#[derive(Debug, Clone)]
struct TextLayout {
    color: bool,
}

impl TextLayout {
    fn colored() -> Self {
        Self { color: true }
    }

    fn plain() -> Self {
        Self { color: false }
    }

    fn level(&self, level: log::Level) -> String {
        if !self.color {
            return format!("{level:>5}");
        }

        let code = match level {
            log::Level::Error => 31,
            log::Level::Warn => 33,
            log::Level::Info => 32,
            log::Level::Debug => 34,
            log::Level::Trace => 35,
        };

        format!("\x1b[{code}m{level:>5}\x1b[0m")
    }
}

impl Layout for TextLayout {
    fn format(
        &self,
        record: &Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();
        let now = Zoned::now().with_time_zone(TimeZone::UTC);

        write!(output, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;
        write!(output, "{}  ", self.level(record.level()))?;
        write!(output, "{}", record.args())?;

        Ok(output.into_bytes())
    }
}

pub(super) fn init(args: &Args) {
    logforth::builder()
        .dispatch(|d| {
            let d = d.filter(args.log_level.env_filter());

            match args.log_style {
                LogStyle::Color => d.append(Stdout::default().with_layout(TextLayout::colored())),
                LogStyle::Text => d.append(Stdout::default().with_layout(TextLayout::plain())),
                LogStyle::Json => d.append(Stdout::default().with_layout(JsonLayout::default())),
            }
        })
        .apply();
}

#[cfg(test)]
mod tests {
    use super::TextLayout;

    #[test]
    fn levels_are_padded() {
        assert_eq!(TextLayout::plain().level(log::Level::Warn), " WARN");
        assert_eq!(TextLayout::colored().level(log::Level::Error), "\x1b[31mERROR\x1b[0m");
    }
}
