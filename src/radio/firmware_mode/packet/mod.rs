pub mod layer1;
pub mod layer2;
