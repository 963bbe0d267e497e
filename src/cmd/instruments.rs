//! `symphony instruments`: the supported roster.

use symphony::instruments::roster;

pub fn cmd_instruments() {
    println!();
    println!(
        "{:<12} {:<12} {:<10} {:<10} {:<5} Techniques",
        "Instrument", "Range", "Clef", "Role", "GM"
    );
    println!(
        "{:<12} {:<12} {:<10} {:<10} {:<5} ----------",
        "----------", "-----", "----", "----", "--"
    );
    for profile in roster() {
        println!(
            "{:<12} {:<12} {:<10} {:<10} {:<5} {}",
            profile.id,
            profile.range.to_string(),
            profile.clef,
            profile.default_role,
            profile.gm_program,
            console::style(profile.techniques.join(", ")).dim()
        );
    }
    println!();
    println!("{} instruments", roster().len());
    println!();
}
