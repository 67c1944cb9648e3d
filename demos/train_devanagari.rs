use std::collections::HashMap;

use hinditok::{AllowedSpecial, DevanagariTokenizer};

const CORPUS: &str = "भारत एक विशाल देश है। भारत की राजधानी नई दिल्ली है। \
हिंदी भारत की राजभाषा है और करोड़ों लोग हिंदी बोलते हैं। \
नमस्ते दुनिया! आज का दिन बहुत अच्छा है। वर्ष २०२४ में बहुत कुछ हुआ। \
We're learning Hindi: नमस्ते means hello.";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut tokenizer = DevanagariTokenizer::new()?;
    let summary = tokenizer.train(CORPUS, 400, true)?;
    println!(
        "learned {} merges, {} -> {} tokens",
        summary.merges, summary.input_len, summary.output_len
    );

    tokenizer.register_special_tokens(HashMap::from([
        (String::from("<|endoftext|>"), 400),
        (String::from("<|pad|>"), 401),
    ]));

    let text = "नमस्ते भारत<|endoftext|>";
    let ids = tokenizer.encode(text, &AllowedSpecial::All)?;
    println!("{text:?} -> {ids:?}");

    let decoded = tokenizer.decode(&ids)?;
    println!("decoded: {decoded:?}");
    assert_eq!(decoded, text);

    match tokenizer.encode(text, &AllowedSpecial::NoneRaise) {
        Ok(_) => println!("unexpected: special token accepted"),
        Err(e) => println!("none_raise: {e}"),
    }

    Ok(())
}
