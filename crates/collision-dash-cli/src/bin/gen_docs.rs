//! Binary that emits command-line options markdown to stdout.
//!
//! Used to refresh `docs/command-line-options.md`.

fn main() {
    print!("{}", collision_dash_cli::render_options_markdown());
}
