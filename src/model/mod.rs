pub mod node;
pub mod patch;
pub mod test_case;
pub mod token;
pub mod work_item;
