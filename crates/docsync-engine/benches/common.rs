// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
#[allow(dead_code)]
pub fn generate_markup(sections: usize) -> String {
    let base = "<h>Section</h><p>Paragraph with some content.</p><list><listItem><p>Bullet point</p></listItem><listItem><p>Another item<image/></p></listItem></list>";
    base.repeat(sections)
}

#[allow(dead_code)]
pub fn generate_nested_markup(depth: usize) -> String {
    let mut markup = String::new();
    for _ in 0..depth {
        markup.push_str("<blockQuote><p>Quoted text at this level.</p>");
    }
    for _ in 0..depth {
        markup.push_str("</blockQuote>");
    }
    markup
}
