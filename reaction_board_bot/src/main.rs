use arch_bot_commons::*;

fn main() {
    start_everything("WARN,reaction_board_bot=debug", reaction_board_bot::entry());
}
