mod graph_backward;
mod serialization;
mod weight_store;
