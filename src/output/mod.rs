pub mod formatter;

pub use formatter::{
    format_elapsed, format_finish, format_individual_table, format_individual_tsv,
    format_runner_list, format_team_results, should_use_colors, UNKNOWN_LABEL,
};
