// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A minimal line-based prompter driving intake from a terminal: read a
//! line, no menus, no colors, no history. §1/§10.A scope the rich
//! interactive shell out; this is just enough to answer the orchestration
//! agent's questions end to end.

use lorch_engine::{IntakeQuestion, Prompter, PrompterResponse};
use std::io::{BufRead, Write};

pub struct StdioPrompter;

impl StdioPrompter {
    fn read_line(&self, prompt: &str) -> String {
        eprint!("{prompt}");
        std::io::stderr().flush().ok();
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok();
        line.trim().to_string()
    }
}

impl Prompter for StdioPrompter {
    fn ask(&mut self, question: &IntakeQuestion) -> PrompterResponse {
        match question {
            IntakeQuestion::ProposedTasks { plan_summary, candidates, tasks } => {
                if candidates.len() > 1 {
                    eprintln!("Plan candidates (descending confidence):");
                    for c in candidates {
                        eprintln!("  ({:.2}) {}", c.confidence, c.summary);
                    }
                }
                eprintln!("Plan: {plan_summary}");
                for (id, task) in tasks {
                    eprintln!("  [{id}] {} ({} file(s))", task.title, task.files.len());
                }
                let answer = self.read_line("Approve this plan? [y/N/clarify <text>]: ");
                match answer.split_once(' ') {
                    Some(("clarify", rest)) => PrompterResponse::Clarify(vec![rest.to_string()]),
                    _ if answer.eq_ignore_ascii_case("y") => PrompterResponse::Approve,
                    _ => PrompterResponse::Decline,
                }
            }
            IntakeQuestion::NeedsClarification { questions } => {
                for q in questions {
                    eprintln!("Question: {q}");
                }
                let answer = self.read_line("Your answer [blank to decline]: ");
                if answer.is_empty() {
                    PrompterResponse::Decline
                } else {
                    PrompterResponse::Clarify(vec![answer])
                }
            }
            IntakeQuestion::PlanConflict { description } => {
                eprintln!("Plan conflict: {description}");
                let answer = self.read_line("How should this be resolved? [blank to decline]: ");
                if answer.is_empty() {
                    PrompterResponse::Decline
                } else {
                    PrompterResponse::ResolveConflict(vec![answer])
                }
            }
        }
    }
}
