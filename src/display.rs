/// Terminal rendering of a finished composition
use colored::*;

use crate::pipeline::Composition;

const EXCERPT_CHARS: usize = 80;

pub struct CompositionVisual;

impl CompositionVisual {
    pub fn render(c: &Composition) -> String {
        let mut out = String::new();

        out.push_str(&format!(
            "{} {}\n",
            "🖋".bright_yellow(),
            c.persona.display_name().bright_yellow().bold()
        ));
        out.push_str(&format!("{} {}\n\n", "👁".bright_cyan(), c.scene.as_str().white()));

        if c.candidates.is_empty() {
            out.push_str(&format!("{}\n\n", "No reference poems used".dimmed()));
        } else {
            out.push_str(&format!("{}\n", "References:".bright_cyan()));
            for (i, poem) in c.candidates.iter().enumerate() {
                out.push_str(&format!(
                    "   {}. {} {}\n      {}\n",
                    (i + 1).to_string().cyan(),
                    poem.display_title(i).white(),
                    format!("({:.2})", poem.score).dimmed(),
                    poem.excerpt(EXCERPT_CHARS).replace('\n', " / ").dimmed()
                ));
            }
            out.push('\n');
        }

        for line in c.poem.display_text().lines() {
            out.push_str(&format!("   {}\n", line.bright_white()));
        }
        out
    }
}
