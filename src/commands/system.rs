pub fn print_help() {
    println!("\n📚 Paper Commands:");
    println!("  papers              - List registered papers");
    println!("  open <title>        - Open a registered paper");
    println!("  add <path> [title]  - Process, embed and register a .tex file, folder or .tar.gz (quote paths with spaces)");
    println!();

    println!("🔍 Retrieval Commands (on the open paper):");
    println!("  section a / b / c   - Chunks by [section, subsection, subsubsection]");
    println!("  search <text>       - Chunks most similar to the text");
    println!("  call <name> <json>  - Run a tool call, e.g. call search_from_text {{\"query\": \"loss\", \"top_n\": 3}}");
    println!("  tools               - Show the tool declarations");
    println!();

    println!("📝 Instruction Commands:");
    println!("  inst                - Show the system instruction");
    println!("  inst set <text>     - Replace and save the system instruction");
    println!();

    println!("⚙️ System Commands:");
    println!("  help  - Show this help menu");
    println!("  exit  - Exit the program");
}
